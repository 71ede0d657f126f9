//! Configuration-file discovery and the whitespace-table format.
//!
//! Files live in `$HOME/.config/` with `/etc/` as the fallback. Each line
//! is `NAME <ws> red <ws> green <ws> blue`; the output name may itself
//! contain blanks, so the values are taken from the end of the line.
//! `#` opens a comment, blank lines are skipped, and a malformed line is
//! reported on stderr and ignored rather than failing the tool.

use crate::args::{parse_double, parse_double_signed};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve the pathname of a configuration file. The home candidate wins
/// when it exists; otherwise the `/etc` path is returned, whether or not
/// anything is there (opening it reports the real error).
pub fn conf_path(name: &str) -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let candidate = home.join(".config").join(name);
    if candidate.exists() {
        Some(candidate)
    } else {
        Some(Path::new("/etc").join(name))
    }
}

/// One `NAME red green blue` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripleTable {
    pub names: Vec<String>,
    pub red: Vec<f64>,
    pub green: Vec<f64>,
    pub blue: Vec<f64>,
}

impl TripleTable {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Values for an output, matched ASCII-case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<(f64, f64, f64)> {
        self.names
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .map(|i| (self.red[i], self.green[i], self.blue[i]))
    }
}

/// Split one table line into `(name, red, green, blue)` fields.
fn split_line(line: &str) -> Option<(&str, &str, &str, &str)> {
    let mut fields: Vec<(usize, &str)> = Vec::new();
    let mut offset = 0;
    for chunk in line.split_inclusive([' ', '\t']) {
        let trimmed = chunk.trim_matches([' ', '\t']);
        if !trimmed.is_empty() {
            // chunk starts at `offset`; leading blanks were already split off
            fields.push((offset, trimmed));
        }
        offset += chunk.len();
    }
    if fields.len() < 4 {
        return None;
    }
    let (_, blue) = fields[fields.len() - 1];
    let (_, green) = fields[fields.len() - 2];
    let (name_end, red) = fields[fields.len() - 3];
    let name = line[..name_end].trim_matches([' ', '\t']);
    if name.is_empty() {
        return None;
    }
    Some((name, red, green, blue))
}

/// Parse a triple table. `signed` admits negative values (contrast tables
/// use them); gamma and brightness tables do not.
pub fn load_triple_table(program: &str, path: &Path, signed: bool) -> io::Result<TripleTable> {
    let content = std::fs::read_to_string(path)?;
    let mut table = TripleTable::default();
    let parse = if signed { parse_double_signed } else { parse_double };

    for (lineno, line) in content.lines().enumerate() {
        let lineno = lineno + 1;
        let stripped = line.trim_start_matches([' ', '\t']);
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let parsed = split_line(line).and_then(|(name, r, g, b)| {
            Some((name, parse(r)?, parse(g)?, parse(b)?))
        });
        match parsed {
            Some((name, r, g, b)) => {
                table.names.push(name.to_owned());
                table.red.push(r);
                table.green.push(g);
                table.blue.push(b);
            }
            None => {
                eprintln!(
                    "{program}: ignoring malformatted line in {}: {lineno}",
                    path.display()
                );
            }
        }
    }
    debug!(
        target: "base.config",
        path = %path.display(),
        entries = table.names.len(),
        "table_loaded"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_table(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_names_and_values() {
        let file = write_table(
            "# gamma table\n\
             \n\
             DVI-0  1.0 1.1 1.2\n\
             eDP1\t0.9\t1.0\t1.0\n",
        );
        let table = load_triple_table("cg-test", file.path(), false).unwrap();
        assert_eq!(table.names, vec!["DVI-0", "eDP1"]);
        assert_eq!(table.lookup("dvi-0"), Some((1.0, 1.1, 1.2)));
        assert_eq!(table.lookup("EDP1"), Some((0.9, 1.0, 1.0)));
        assert_eq!(table.lookup("HDMI-0"), None);
    }

    #[test]
    fn names_may_contain_blanks() {
        let file = write_table("Some Monitor Name   0.5 0.5 0.5\n");
        let table = load_triple_table("cg-test", file.path(), false).unwrap();
        assert_eq!(table.names, vec!["Some Monitor Name"]);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let file = write_table(
            "GOOD 1 1 1\n\
             missing values\n\
             BAD 1 x 1\n\
             NEG 1 -1 1\n\
             ALSO-GOOD 2 2 2\n",
        );
        let table = load_triple_table("cg-test", file.path(), false).unwrap();
        assert_eq!(table.names, vec!["GOOD", "ALSO-GOOD"]);
    }

    #[test]
    fn signed_tables_accept_negatives() {
        let file = write_table("OUT -0.1 0 1.1\n");
        let table = load_triple_table("cg-test", file.path(), true).unwrap();
        assert_eq!(table.lookup("out"), Some((-0.1, 0.0, 1.1)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_triple_table("cg-test", Path::new("/nonexistent/gamma"), false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
