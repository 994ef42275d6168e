//! Parsers for the control program's human-readable listings.
//!
//! The output is an unversioned report whose header text, warnings, and hints
//! vary by locale and version. Nothing here fails on unexpected input; rows
//! that do not fit are skipped.

use std::collections::HashSet;

use super::distro::{CatalogEntry, InstalledList, RunState, VerboseRow};

/// Prefix marking the default distribution in list output.
pub const DEFAULT_MARKER: char = '*';

const HEADER_TOKEN: &str = "NAME";
const INSTALL_HINTS: [&str; 2] = ["wsl.exe --install", "wsl --install"];

/// Decode control program output. It is always UTF-16LE regardless of the host locale.
pub fn decode_output(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    strip_padding(&String::from_utf16_lossy(&units))
}

/// Decode text whose encoding is not guaranteed (error streams, shell wrappers).
pub fn decode_lenient(bytes: &[u8]) -> String {
    if looks_like_utf16le(bytes) {
        decode_output(bytes)
    } else {
        strip_padding(&String::from_utf8_lossy(bytes))
    }
}

fn looks_like_utf16le(bytes: &[u8]) -> bool {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return true;
    }
    if bytes.len() < 2 {
        return false;
    }
    let pairs = bytes.len() / 2;
    let zero_high = bytes.chunks_exact(2).filter(|pair| pair[1] == 0).count();
    zero_high * 2 > pairs
}

fn strip_padding(text: &str) -> String {
    text.trim_start_matches('\u{feff}').replace('\0', "")
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

fn strip_default_marker(line: &str) -> (bool, &str) {
    match line.strip_prefix(DEFAULT_MARKER) {
        Some(rest) => (true, rest.trim_start()),
        None => (false, line),
    }
}

fn is_header(line: &str) -> bool {
    line.split_whitespace().any(|token| token == HEADER_TOKEN)
}

fn is_separator(line: &str) -> bool {
    line.contains("---") && line.chars().all(|c| c == '-' || c.is_whitespace())
}

/// Parse `-l -q`: one name per line.
pub fn parse_quiet_list(text: &str) -> InstalledList {
    let mut list = InstalledList::default();
    let mut seen = HashSet::new();

    for line in lines(text) {
        let (is_default, name) = strip_default_marker(line);
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        if is_default && list.default.is_none() {
            list.default = Some(name.to_string());
        }
        list.names.push(name.to_string());
    }

    list
}

/// Parse `-l -v`: `NAME STATE VERSION` columns after a header row.
///
/// When no header is present at all (a locale that translates the column
/// titles) every line is treated as a candidate row.
pub fn parse_verbose_list(text: &str) -> Vec<VerboseRow> {
    let all: Vec<&str> = lines(text).collect();
    let body: &[&str] = match all.iter().position(|line| is_header(line)) {
        Some(idx) => &all[idx + 1..],
        None => &all,
    };

    body.iter()
        .filter(|line| !is_separator(line))
        .filter_map(|line| parse_verbose_row(line))
        .collect()
}

fn parse_verbose_row(line: &str) -> Option<VerboseRow> {
    let (is_default, rest) = strip_default_marker(line);
    let mut tokens = rest.split_whitespace();
    let name = tokens.next()?;
    let raw_state = tokens.next()?;
    Some(VerboseRow {
        name: name.to_string(),
        state: RunState::parse(raw_state),
        raw_state: raw_state.to_string(),
        version: tokens.next().map(str::to_string),
        is_default,
    })
}

/// Parse `--list --online`: free-form preamble, then `NAME FRIENDLY NAME` rows.
pub fn parse_catalog(text: &str) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut data_started = false;

    for line in lines(text) {
        if INSTALL_HINTS.iter().any(|hint| line.contains(hint)) || is_separator(line) {
            continue;
        }
        if !data_started {
            data_started = is_header(line);
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        let friendly = tokens.collect::<Vec<_>>().join(" ");
        let friendly = if friendly.is_empty() {
            name.to_string()
        } else {
            friendly
        };
        entries.push(CatalogEntry::new(name, friendly));
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn decode_output_strips_bom_and_nul_padding() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(utf16le("Ubuntu\0\0\r\nDebian\r\n"));
        assert_eq!(decode_output(&bytes), "Ubuntu\r\nDebian\r\n");
    }

    #[test]
    fn decode_output_ignores_odd_trailing_byte() {
        let mut bytes = utf16le("Debian");
        bytes.push(0x41);
        assert_eq!(decode_output(&bytes), "Debian");
    }

    #[test]
    fn decode_lenient_accepts_both_encodings() {
        assert_eq!(decode_lenient(b"plain error\n"), "plain error\n");
        assert_eq!(decode_lenient(&utf16le("wide error")), "wide error");
    }

    #[test]
    fn quiet_list_strips_default_marker_and_keeps_order() {
        let list = parse_quiet_list("* Ubuntu-20.04\r\nDebian\r\n");
        assert_eq!(list.names, vec!["Ubuntu-20.04", "Debian"]);
        assert_eq!(list.default.as_deref(), Some("Ubuntu-20.04"));
    }

    #[test]
    fn quiet_list_removes_blank_lines_and_case_insensitive_duplicates() {
        let list = parse_quiet_list("\r\nDebian\r\n\r\n  \r\ndebian\r\nkali-linux\n*\n");
        assert_eq!(list.names, vec!["Debian", "kali-linux"]);
        assert_eq!(list.default, None);
    }

    #[test]
    fn quiet_list_only_strips_a_single_marker() {
        let list = parse_quiet_list("**odd\r\n");
        assert_eq!(list.names, vec!["*odd"]);
    }

    #[test]
    fn verbose_list_extracts_name_and_state() {
        let text = "  NAME            STATE           VERSION\r\n\
                    * Ubuntu-20.04    Running         2\r\n\
                      Debian          Stopped         1\r\n";
        let rows = parse_verbose_list(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Ubuntu-20.04");
        assert_eq!(rows[0].state, RunState::Running);
        assert!(rows[0].is_default);
        assert_eq!(rows[0].version.as_deref(), Some("2"));
        assert_eq!(rows[1].name, "Debian");
        assert_eq!(rows[1].state, RunState::Stopped);
        assert!(!rows[1].is_default);
    }

    #[test]
    fn verbose_list_skips_preamble_separators_and_short_rows() {
        let text = "Warning: something odd\r\n\
                    NAME      STATE     VERSION\r\n\
                    -------------------------\r\n\
                    lonely\r\n\
                    Alpine    Installing    2\r\n";
        let rows = parse_verbose_list(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Alpine");
        assert_eq!(rows[0].state, RunState::Unknown);
        assert_eq!(rows[0].raw_state, "Installing");
    }

    #[test]
    fn verbose_list_without_header_parses_every_row() {
        let rows = parse_verbose_list("* Debian Running 2\nUbuntu Stopped 2\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].state, RunState::Stopped);
    }

    #[test]
    fn catalog_skips_preamble_and_hint() {
        let text = "The following is a list of valid distributions that can be installed.\r\n\
                    Install using 'wsl.exe --install <Distro>'.\r\n\
                    \r\n\
                    NAME                            FRIENDLY NAME\r\n\
                    Ubuntu                          Ubuntu\r\n\
                    Ubuntu-24.04                    Ubuntu 24.04 LTS\r\n\
                    kali-linux                      Kali   Linux Rolling\r\n";
        let entries = parse_catalog(text);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "Ubuntu");
        assert_eq!(entries[0].friendly_name, "Ubuntu");
        assert_eq!(entries[1].friendly_name, "Ubuntu 24.04 LTS");
        assert_eq!(entries[2].friendly_name, "Kali Linux Rolling");
        assert_eq!(entries[2].description, "Kali Linux Rolling distribution");
    }

    #[test]
    fn catalog_uses_name_when_friendly_name_missing() {
        let entries = parse_catalog("NAME FRIENDLY NAME\nOracleLinux_9_1\nOracleLinux_9_1 dup\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].friendly_name, "OracleLinux_9_1");
    }

    #[test]
    fn catalog_without_header_is_empty() {
        assert!(parse_catalog("Error: network unreachable\nUbuntu Ubuntu\n").is_empty());
    }
}
