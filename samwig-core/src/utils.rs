use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;

use crate::errors::Result;

/// Capacity used for buffered readers and writers
pub const IO_BUFFER_SIZE: usize = 65536;

/// Path value that stands for standard input or output
pub const STDIO_PATH: &str = "-";

///
/// Wrap any reader in a buffered reader, transparently decoding gzip input.
/// Compression is detected by peeking at the magic number, so piped input works too.
///
/// # Arguments
///
/// - input: anything implementing [Read]
///
pub fn get_dynamic_reader_from<R: Read + 'static>(input: R) -> Result<Box<dyn BufRead>> {
    let mut buf_input = BufReader::with_capacity(IO_BUFFER_SIZE, input);

    let is_gzipped = {
        let peek = buf_input.fill_buf()?;
        peek.len() >= 2 && peek[0] == 0x1f && peek[1] == 0x8b
    };

    if is_gzipped {
        let gz = MultiGzDecoder::new(buf_input);
        Ok(Box::new(BufReader::with_capacity(IO_BUFFER_SIZE, gz)))
    } else {
        Ok(Box::new(buf_input))
    }
}

///
/// Get a reader for either a gzip'd or non-gzip'd file.
///
/// # Arguments
///
/// - path: path to the file to read
///
pub fn get_dynamic_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    get_dynamic_reader_from(file)
}

///
/// Get a reader for a file path, or standard input when the path is `-`.
///
pub fn get_dynamic_reader_w_stdin(file_path_str: &str) -> Result<Box<dyn BufRead>> {
    if file_path_str == STDIO_PATH {
        get_dynamic_reader_from(io::stdin())
    } else {
        get_dynamic_reader(Path::new(file_path_str))
    }
}

///
/// Get a buffered writer for a file path, or standard output when no path (or `-`) is given.
/// Parent directories of the output file are created when missing.
///
pub fn get_dynamic_writer(file_path: Option<&Path>) -> Result<Box<dyn Write>> {
    match file_path {
        Some(path) if path != Path::new(STDIO_PATH) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = File::create(path)?;
            Ok(Box::new(BufWriter::with_capacity(IO_BUFFER_SIZE, file)))
        }
        _ => Ok(Box::new(BufWriter::with_capacity(
            IO_BUFFER_SIZE,
            io::stdout(),
        ))),
    }
}
