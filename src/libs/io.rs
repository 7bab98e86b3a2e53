use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Write};

/// Open `input` for buffered reading. `stdin` reads standard input;
/// a `.gz` suffix gets transparent decompression.
pub fn reader(input: &str) -> Result<Box<dyn BufRead>> {
    let reader: Box<dyn BufRead> = if input == "stdin" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let path = std::path::Path::new(input);
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {}", path.display()))?;

        if path.extension() == Some(std::ffi::OsStr::new("gz")) {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    };

    Ok(reader)
}

/// Open `output` for buffered writing. `stdout` writes to standard output.
pub fn writer(output: &str) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = if output == "stdout" {
        Box::new(BufWriter::new(std::io::stdout()))
    } else {
        let file = std::fs::File::create(output)
            .with_context(|| format!("could not create {}", output))?;
        Box::new(BufWriter::new(file))
    };

    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let rdr = reader(path.to_str().unwrap()).unwrap();
        assert_eq!(rdr.lines().count(), 2);
    }

    #[test]
    fn test_reader_missing_file() {
        assert!(reader("no/such/file.txt").is_err());
    }

    #[test]
    fn test_reader_gz() {
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt.gz");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut enc = GzEncoder::new(file, flate2::Compression::default());
            enc.write_all(b">s1\nACGT\n").unwrap();
            enc.finish().unwrap();
        }

        let rdr = reader(path.to_str().unwrap()).unwrap();
        let lines: Vec<_> = rdr.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec![">s1", "ACGT"]);
    }
}
