//! Hex dump rendering for payload inspection

use std::fmt::Write as _;

const BYTES_PER_LINE: usize = 16;

/// Render bytes as `OFFSET  hex bytes  |ascii|` lines, 16 bytes per line
///
/// Non-printable bytes show as `.` in the ASCII column.
#[must_use]
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();

    for (line, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        if line > 0 {
            out.push('\n');
        }

        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    char::from(b)
                } else {
                    '.'
                }
            })
            .collect();

        let _ = write!(
            out,
            "{:08x}  {:<width$}  |{}|",
            line * BYTES_PER_LINE,
            hex.join(" "),
            ascii,
            width = BYTES_PER_LINE * 3 - 1
        );
    }

    out
}
