/// Greedy word wrap; always returns at least one line.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let fits = current.chars().count() + 1 + word.chars().count() <= width;
        if !current.is_empty() && !fits {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Shortens `s` to at most `max_len` characters, ending in `…` when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    match max_len {
        0 => String::new(),
        n => {
            let mut out: String = s.chars().take(n - 1).collect();
            out.push('…');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_short_text_on_one_line() {
        assert_eq!(wrap("incompatible irreps", 30), vec!["incompatible irreps"]);
    }

    #[test]
    fn wrap_breaks_between_words() {
        assert_eq!(
            wrap("layer one_hot is missing num_types", 16),
            vec!["layer one_hot is", "missing", "num_types"]
        );
    }

    #[test]
    fn wrap_empty_text_yields_one_blank_line() {
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn truncate_leaves_fitting_text() {
        assert_eq!(truncate("1x0e+1x1o", 9), "1x0e+1x1o");
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("node_features", 6), "node_…");
        assert_eq!(truncate("abc", 1), "…");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("ÅÅÅÅ", 3), "ÅÅ…");
    }
}
