use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;
use esframe::log_or_err;
use esframe::structs::pes::PesReader;
use log::Level;

use crate::cli::command::InputFormat;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    is_pipe: bool,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let reader: Box<dyn Read + Send> = if is_pipe {
            Box::new(io::stdin())
        } else {
            let file = File::open(input_path)?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader, is_pipe })
    }

    /// Read a chunk of data into the provided buffer
    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let bytes_read = self.reader.read(buffer)?;
        Ok(bytes_read)
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.read_chunk(&mut buffer)?;
            if bytes_read == 0 {
                break; // EOF
            }

            if !callback(&buffer[..bytes_read])? {
                break; // Callback requested stop
            }
        }

        Ok(())
    }
}

pub const CHUNK_SIZE: usize = 64 * 1024;

pub struct ReaderState {
    pub fail_level: Level,
}

/// Audio payloads of an input, each with the PTS it starts at.
///
/// Raw elementary streams carry no timing, so every chunk comes without a
/// timestamp. PES input is unpacked packet by packet; broken packets are
/// logged and skipped unless the fail level makes them fatal.
pub struct PayloadReader {
    input: InputReader,
    format: InputFormat,
    pes: PesReader,
    state: ReaderState,
}

impl PayloadReader {
    pub fn new<P: AsRef<Path>>(
        input_path: P,
        format: InputFormat,
        pes: PesReader,
        fail_level: Level,
    ) -> Result<Self> {
        Ok(Self {
            input: InputReader::new(input_path)?,
            format,
            pes,
            state: ReaderState { fail_level },
        })
    }

    pub fn is_pipe(&self) -> bool {
        self.input.is_pipe()
    }

    /// PES packets dropped so far.
    pub fn dropped_packets(&self) -> usize {
        self.pes.dropped_packets()
    }

    /// Feeds every payload to `callback` until EOF or until it returns
    /// `Ok(false)`. Returns the number of input bytes read.
    pub fn process_payloads<F>(&mut self, mut callback: F) -> Result<u64>
    where
        F: FnMut(&[u8], Option<u64>) -> Result<bool>,
    {
        let mut bytes_read = 0u64;
        let Self {
            input,
            format,
            pes,
            state,
        } = self;

        input.process_chunks(CHUNK_SIZE, |chunk| {
            bytes_read += chunk.len() as u64;

            match format {
                InputFormat::Es => callback(chunk, None),
                InputFormat::Pes => {
                    pes.push_bytes(chunk);
                    for payload in pes.by_ref() {
                        match payload {
                            Ok(payload) => {
                                if !callback(&payload.data, payload.pts)? {
                                    return Ok(false);
                                }
                            }
                            Err(e) => log_or_err!(state, Level::Warn, e),
                        }
                    }
                    Ok(true)
                }
            }
        })?;

        Ok(bytes_read)
    }
}
