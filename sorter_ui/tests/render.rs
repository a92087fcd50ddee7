use rstest::rstest;
use sorter_traits::StatusDisplay;
use sorter_ui::{TerminalDisplay, render_queue};

#[rstest]
#[case(&[], "[ ]")]
#[case(&[None, None], "[   .   . ]")]
#[case(&[Some((14, 1)), None, Some((9, 2))], "[  14   .   9* ]")]
#[case(&[Some((255, 1))], "[ 255 ]")]
fn queue_cells(#[case] slots: &[Option<(u16, u8)>], #[case] expected: &str) {
    assert_eq!(render_queue(slots), expected);
}

#[test]
fn one_line_per_report() {
    let mut d = TerminalDisplay::new(Vec::new());
    d.show_position(-3, 197);
    d.show_queue(&[Some((16, 1)), None]);
    d.show_drift(12, 1, 199);
    let text = String::from_utf8(d.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "pos   raw=      -3 phase= 197",
            "queue [  16   . ]",
            "drift zero=12 events=1 last_raw=199",
        ]
    );
}
