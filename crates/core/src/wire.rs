//! Minimal instruction encoding used by the reference sockets.
//!
//! The wire codec proper is an external collaborator (see the crate's
//! module docs): the core only needs to hand the broadcast and per-viewer
//! sockets *some* byte representation for the handful of instructions it
//! emits itself (`sync`, `error`). This uses a simple length-prefixed,
//! comma-separated element, semicolon-terminated shape, but a host is
//! free to swap in any [`Socket`](crate::socket::Socket) that reframes
//! bytes however its own wire format requires.

fn element(s: &str) -> String {
    format!("{}.{}", s.len(), s)
}

/// Encodes `opcode` followed by `args` into one length-prefixed
/// instruction, e.g. `encode("sync", &["1000"])` → `"4.sync,4.1000;"`.
pub fn encode(opcode: &str, args: &[&str]) -> String {
    let mut out = element(opcode);
    for arg in args {
        out.push(',');
        out.push_str(&element(arg));
    }
    out.push(';');
    out
}

pub fn encode_sync(timestamp: i64) -> String {
    encode("sync", &[&timestamp.to_string()])
}

pub fn encode_error(status: i32, message: &str) -> String {
    encode("error", &[message, &status.to_string()])
}

/// Reads one length-prefixed instruction from `reader`, returning its
/// opcode and remaining elements as argv. Returns `Ok(None)` on a clean
/// EOF before any bytes of a new instruction are read.
pub fn read_instruction<R: std::io::BufRead>(
    reader: &mut R,
) -> std::io::Result<Option<(String, Vec<String>)>> {
    let mut elements = Vec::new();
    loop {
        match read_element(reader)? {
            None if elements.is_empty() => return Ok(None),
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated instruction",
                ));
            }
            Some((text, terminator)) => {
                elements.push(text);
                if terminator == b';' {
                    break;
                }
            }
        }
    }

    let mut elements = elements.into_iter();
    let opcode = elements.next().unwrap_or_default();
    Ok(Some((opcode, elements.collect())))
}

/// Reads one `<len>.<content>` element followed by its `,` or `;`
/// terminator. Returns `None` on EOF before any byte of a new element.
fn read_element<R: std::io::BufRead>(
    reader: &mut R,
) -> std::io::Result<Option<(String, u8)>> {
    let mut len_buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte)?;
        if n == 0 {
            if len_buf.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated instruction length",
            ));
        }
        if byte[0] == b'.' {
            break;
        }
        len_buf.push(byte[0]);
    }

    let len: usize = std::str::from_utf8(&len_buf)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad element length")
        })?;

    let mut content = vec![0u8; len];
    reader.read_exact(&mut content)?;
    let text = String::from_utf8(content)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "non-utf8 element"))?;

    let mut terminator = [0u8; 1];
    reader.read_exact(&mut terminator)?;
    if terminator[0] != b',' && terminator[0] != b';' {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "missing element terminator",
        ));
    }

    Ok(Some((text, terminator[0])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_sync_instruction() {
        assert_eq!(encode_sync(1000), "4.sync,4.1000;");
    }

    #[test]
    fn encodes_error_instruction() {
        assert_eq!(
            encode_error(500, "Aborted. See logs."),
            "5.error,19.Aborted. See logs.,3.500;"
        );
    }

    #[test]
    fn encodes_opcode_with_no_args() {
        assert_eq!(encode("end", &[]), "3.end;");
    }

    #[test]
    fn reads_back_an_encoded_instruction() {
        let mut cursor = std::io::Cursor::new(encode_sync(1000).into_bytes());
        let (opcode, argv) = read_instruction(&mut cursor).unwrap().unwrap();
        assert_eq!(opcode, "sync");
        assert_eq!(argv, vec!["1000".to_string()]);
    }

    #[test]
    fn read_instruction_returns_none_at_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        assert!(read_instruction(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn reads_back_consecutive_instructions() {
        let mut data = encode("mouse", &["1", "2", "0"]);
        data.push_str(&encode("key", &["65", "1"]));
        let mut cursor = std::io::Cursor::new(data.into_bytes());

        let (opcode, argv) = read_instruction(&mut cursor).unwrap().unwrap();
        assert_eq!(opcode, "mouse");
        assert_eq!(argv, vec!["1".to_string(), "2".to_string(), "0".to_string()]);

        let (opcode, argv) = read_instruction(&mut cursor).unwrap().unwrap();
        assert_eq!(opcode, "key");
        assert_eq!(argv, vec!["65".to_string(), "1".to_string()]);

        assert!(read_instruction(&mut cursor).unwrap().is_none());
    }
}
