//! Greedy word wrapping for text bodies.

/// Wrap `text` so that no line is longer than `width` characters, breaking
/// only at whitespace. Existing line breaks, leading indentation and the
/// spacing between words on the same line are kept; the whitespace at a new
/// break is dropped, as is trailing whitespace. A single word longer than
/// `width` is placed on its own line and never split. A width of zero leaves
/// the text unchanged.
pub fn wrap_text(text: &str, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| wrap_line(line, width))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap_line(line: &str, width: usize) -> String {
    let line = line.trim_end();
    let mut rest = line.trim_start();
    let indent = &line[..line.len() - rest.len()];

    let mut out = String::with_capacity(line.len());
    out.push_str(indent);
    let mut current = indent.chars().count();
    let mut first = true;

    while !rest.is_empty() {
        let gap_end = rest.len() - rest.trim_start().len();
        let (gap, tail) = rest.split_at(gap_end);
        let word_end = tail.find(char::is_whitespace).unwrap_or(tail.len());
        let (word, tail) = tail.split_at(word_end);
        rest = tail;

        let len = word.chars().count();
        let gap_len = gap.chars().count();
        if first {
            first = false;
        } else if current + gap_len + len <= width {
            out.push_str(gap);
            current += gap_len;
        } else {
            out.push('\n');
            current = 0;
        }
        out.push_str(word);
        current += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("The quick brown fox", 10, "The quick\nbrown fox")]
    #[case("short", 80, "short")]
    #[case("one two three", 3, "one\ntwo\nthree")]
    #[case("a supercalifragilistic word", 5, "a\nsupercalifragilistic\nword")]
    #[case("first line\nsecond line here", 11, "first line\nsecond line\nhere")]
    #[case("keep  double  spaces", 80, "keep  double  spaces")]
    #[case("    indented code line", 80, "    indented code line")]
    #[case("  two  spaces here", 9, "  two\nspaces\nhere")]
    #[case("col1\tcol2 ", 80, "col1\tcol2")]
    fn wraps_at_whitespace(#[case] input: &str, #[case] width: usize, #[case] expected: &str) {
        assert_eq!(wrap_text(input, width), expected);
    }

    #[test]
    fn zero_width_is_a_no_op() {
        assert_eq!(wrap_text("keep  as   is", 0), "keep  as   is");
    }

    #[test]
    fn no_line_exceeds_width_unless_single_word() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod";
        for line in wrap_text(text, 20).lines() {
            assert!(line.chars().count() <= 20 || !line.contains(' '));
        }
    }
}
