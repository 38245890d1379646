//! Sequencing strings over external byte streams.
//!
//! Buffered I/O itself is an external collaborator; this module only
//! encodes a string once and hands the bytes over, or takes a line of
//! bytes and decodes it once. Stream failures map onto the status
//! channel.

use {
    crate::{status::{Error, Result}, string::Str},
    std::io::{BufRead, ErrorKind, Write},
};

/// Encode `text` as UTF-8 in one pass and write it in one call.
pub fn write_str(writer: &mut dyn Write, text: &Str) -> Result<()>
{
    let encoded = text.to_std_string();
    writer.write_all(encoded.as_bytes()).map_err(|_| Error::Io)
}

/// Read one line and decode it, stripping the line terminator.
///
/// End of stream is `Ok(None)`; malformed input is
/// [`BadEncoding`][`Error::BadEncoding`].
pub fn read_line(reader: &mut dyn BufRead) -> Result<Option<Str>>
{
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => Ok(None),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Some(Str::from_str(&line)?))
        },
        Err(err) if err.kind() == ErrorKind::InvalidData =>
            Err(Error::BadEncoding),
        Err(_) => Err(Error::Io),
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, std::io::Cursor};

    #[test]
    fn strings_round_trip_through_a_stream()
    {
        let mut text = Str::from_str("snow \u{2603} line").unwrap();
        let mut buffer = Vec::new();
        write_str(&mut buffer, &text).unwrap();
        text.free();

        buffer.push(b'\n');
        let mut reader = Cursor::new(buffer);
        let mut back = read_line(&mut reader).unwrap().unwrap();
        assert_eq!(back.to_std_string(), "snow \u{2603} line");
        back.free();

        assert!(read_line(&mut reader).unwrap().is_none());
    }

    #[test]
    fn carriage_returns_are_stripped_with_the_newline()
    {
        let mut reader = Cursor::new(b"dos line\r\nrest".to_vec());
        let mut first = read_line(&mut reader).unwrap().unwrap();
        assert_eq!(first.to_std_string(), "dos line");
        first.free();

        let mut last = read_line(&mut reader).unwrap().unwrap();
        assert_eq!(last.to_std_string(), "rest");
        last.free();
    }

    #[test]
    fn malformed_input_is_an_encoding_failure()
    {
        let mut reader = Cursor::new(vec![0xff, 0xfe, b'\n']);
        assert_eq!(
            read_line(&mut reader).unwrap_err(),
            Error::BadEncoding,
        );
    }
}
