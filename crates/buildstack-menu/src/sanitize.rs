//! Display hygiene for text that comes from the catalog or the remote
//! services before it reaches the terminal.

/// Longest issue message shown in the issues panel.
pub const MAX_MESSAGE_CHARS: usize = 104;

#[derive(Clone, Copy)]
enum Scan {
    Text,
    Escape,
    Csi,
    // OSC/DCS/PM/APC bodies run until BEL or ESC '\'.
    Body { saw_esc: bool },
}

/// Strip terminal escape sequences and control characters from `input`,
/// collapsing it to a single line of at most `max_chars` printable chars.
/// Overlong text ends in `...`.
pub fn clean_text(input: &str, max_chars: usize) -> String {
    let mut kept: Vec<char> = Vec::with_capacity(input.len().min(max_chars + 3));
    let mut scan = Scan::Text;
    let mut overflow = false;

    for c in input.chars() {
        scan = match scan {
            Scan::Escape => match c {
                '[' => Scan::Csi,
                ']' | 'P' | 'X' | '^' | '_' => Scan::Body { saw_esc: false },
                _ => Scan::Text,
            },
            Scan::Csi => {
                if ('@'..='~').contains(&c) {
                    Scan::Text
                } else {
                    Scan::Csi
                }
            }
            Scan::Body { saw_esc } => match c {
                '\x07' => Scan::Text,
                '\\' if saw_esc => Scan::Text,
                '\x1b' => Scan::Body { saw_esc: true },
                _ => Scan::Body { saw_esc: false },
            },
            Scan::Text => {
                if c == '\x1b' {
                    Scan::Escape
                } else {
                    let mapped = match c {
                        '\t' | '\n' | '\r' => Some(' '),
                        c if c.is_control() || is_bidi_control(c) => None,
                        c => Some(c),
                    };
                    if let Some(ch) = mapped {
                        if kept.len() >= max_chars {
                            overflow = true;
                        } else {
                            kept.push(ch);
                        }
                    }
                    Scan::Text
                }
            }
        };
        if overflow {
            break;
        }
    }

    if overflow {
        let cut = max_chars.saturating_sub(3);
        kept.truncate(cut);
        let mut out: String = kept.into_iter().collect();
        out.push_str("...");
        return out;
    }
    kept.into_iter().collect()
}

/// Menu labels: cleaned and cut to `width` columns.
pub fn truncate_label(label: &str, width: usize) -> String {
    clean_text(label, width)
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::{clean_text, truncate_label};

    #[test]
    fn strips_color_and_title_sequences() {
        let input = "port \u{1b}[31m1883\u{1b}[0m \u{1b}]0;pwned\u{7}taken";
        assert_eq!(clean_text(input, 80), "port 1883 taken");
    }

    #[test]
    fn strips_string_terminated_bodies() {
        assert_eq!(clean_text("a\u{1b}Pdata\u{1b}\\b", 80), "ab");
    }

    #[test]
    fn newlines_become_spaces_and_bidi_is_dropped() {
        assert_eq!(clean_text("a\nb\u{202e}c", 80), "a bc");
    }

    #[test]
    fn long_labels_end_in_ellipsis() {
        let got = truncate_label("Home Assistant Supervised Container", 23);
        assert_eq!(got, "Home Assistant Super...");
        assert_eq!(got.chars().count(), 23);
        assert_eq!(truncate_label("Grafana", 23), "Grafana");
    }
}
