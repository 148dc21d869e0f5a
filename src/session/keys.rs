//! Symbolic key name translation.
//!
//! Maps the key names accepted by `send_key` to the byte sequences terminal
//! programs expect to receive. Programs react to these exact bytes, so the
//! table is fixed; names are matched case-insensitively.

/// Key name to terminal sequence table, keyed by lower-cased name.
///
/// Sequences follow the common xterm conventions: CSI forms for arrows and
/// navigation, SS3 forms for f1-f4, CSI tilde forms for the higher function
/// keys, and raw control characters for the ctrl combinations.
static KEY_SEQUENCES: &[(&str, &str)] = &[
    ("enter", "\r"),
    ("return", "\r"),
    ("tab", "\t"),
    ("backspace", "\x08"),
    ("delete", "\x7f"),
    ("escape", "\x1b"),
    ("esc", "\x1b"),
    ("up", "\x1b[A"),
    ("down", "\x1b[B"),
    ("right", "\x1b[C"),
    ("left", "\x1b[D"),
    ("home", "\x1b[H"),
    ("end", "\x1b[F"),
    ("pageup", "\x1b[5~"),
    ("pagedown", "\x1b[6~"),
    ("ctrl+c", "\x03"),
    ("ctrl+d", "\x04"),
    ("ctrl+z", "\x1a"),
    ("ctrl+l", "\x0c"),
    ("ctrl+a", "\x01"),
    ("ctrl+e", "\x05"),
    ("ctrl+k", "\x0b"),
    ("ctrl+u", "\x15"),
    ("ctrl+w", "\x17"),
    ("ctrl+r", "\x12"),
    ("ctrl+s", "\x13"),
    ("ctrl+q", "\x11"),
    ("space", " "),
    ("f1", "\x1bOP"),
    ("f2", "\x1bOQ"),
    ("f3", "\x1bOR"),
    ("f4", "\x1bOS"),
    ("f5", "\x1b[15~"),
    ("f6", "\x1b[17~"),
    ("f7", "\x1b[18~"),
    ("f8", "\x1b[19~"),
    ("f9", "\x1b[20~"),
    ("f10", "\x1b[21~"),
    ("f11", "\x1b[23~"),
    ("f12", "\x1b[24~"),
];

/// Looks up the terminal byte sequence for a symbolic key name.
///
/// Matching is case-insensitive. Returns `None` for names outside the table;
/// callers forward those literally rather than treating them as errors.
pub fn key_sequence(key: &str) -> Option<&'static str> {
    let key = key.to_lowercase();
    KEY_SEQUENCES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, seq)| *seq)
}
