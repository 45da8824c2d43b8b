use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener},
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::pool::{PoolError, ThreadPool};

use super::{ConnectionHeader, ProtocolError, RequestEnvelope, wire::Framing};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to start listener: {0}")]
    Listen(#[from] io::Error),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Accepts connections and dispatches each one onto the worker pool.
pub struct CalcServer {
    address: SocketAddr,
    pool: ThreadPool,
}

impl CalcServer {
    /// Creates a server backed by `thread_count` workers. Returns once
    /// every worker has started up.
    pub fn new(address: SocketAddr, thread_count: u8) -> Result<Self, ServerError> {
        Ok(Self {
            address,
            pool: ThreadPool::new(thread_count)?,
        })
    }

    /// Runs the accept loop. Every accepted connection becomes one pool
    /// job; the worker owns the socket for the job's lifetime.
    pub fn listen(self) -> Result<(), ServerError> {
        info!("listening at {}", self.address);
        let listener = TcpListener::bind(self.address)?;

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|_| "unknown peer".to_string());

                    let peer_closure = peer.clone();
                    let submitted = self.pool.submit(move || {
                        match handle_connection(stream) {
                            Ok(solved) => debug!("{peer_closure}: solved {solved} equations"),
                            Err(e) => warn!("{peer_closure}: {e}"),
                        }
                        // The socket drops here, closing the connection on
                        // every exit path.
                    });
                    if submitted.is_err() {
                        warn!("pool inactive, dropping connection from {peer}");
                    }
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}

/// Drives one connection: decode the header, validate it, decode the
/// envelope, evaluate every equation and write the reply.
///
/// A header that violates the protocol bounds is answered with the blanked
/// rejection echo before the error is returned, so the peer is never left
/// hanging.
fn handle_connection<S: Read + Write>(mut stream: S) -> Result<usize, ProtocolError> {
    let header = ConnectionHeader::decode(&mut stream)?;

    if let Err(e) = header.validate() {
        header.rejection().encode(&mut stream)?;
        stream.flush()?;
        return Err(e);
    }

    debug!(
        "request '{}', {} payload bytes declared",
        header.file_name(),
        header.total_payload_size
    );

    let mut envelope = RequestEnvelope::decode(&mut stream, Framing::Network)?;
    envelope.solve_all();

    header.encode(&mut stream)?;
    envelope.encode_reply(&mut stream, Framing::Network)?;
    stream.flush()?;

    Ok(envelope.equations.len())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::calc::Operator;
    use crate::protocol::{HEADER_SIZE, SolvedBatch, UnsolvedEquation};

    use super::*;

    /// In-memory stand-in for a socket: reads from a prepared request,
    /// collects everything written back.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn request(equations: Vec<UnsolvedEquation>) -> Vec<u8> {
        let envelope = RequestEnvelope::new(7, equations);
        let mut body = Vec::new();
        envelope.encode(&mut body, Framing::Network).unwrap();

        let mut bytes = Vec::new();
        ConnectionHeader::new("batch.equ", body.len() as u64)
            .encode(&mut bytes)
            .unwrap();
        bytes.extend_from_slice(&body);
        bytes
    }

    #[test]
    fn well_formed_request_gets_header_echo_and_solutions() {
        let bytes = request(vec![
            UnsolvedEquation::new(1, 10, Operator::Add as u8, 10),
            UnsolvedEquation::new(2, 15, Operator::ShiftLeft as u8, 2),
        ]);

        let mut stream = MockStream::new(bytes);
        let solved = handle_connection(&mut stream).unwrap();
        assert_eq!(solved, 2);

        let mut reply = Cursor::new(stream.output);
        let echo = ConnectionHeader::decode(&mut reply).unwrap();
        assert_eq!(echo.file_name(), "batch.equ");

        let batch = SolvedBatch::decode(&mut reply, Framing::Network).unwrap();
        assert_eq!(batch.file_id, 7);
        assert_eq!(batch.records[0].value, 20);
        assert_eq!(batch.records[1].value, 60);
    }

    #[test]
    fn failed_equation_does_not_disturb_neighbours() {
        let bytes = request(vec![
            UnsolvedEquation::new(1, 6, Operator::Multiply as u8, 7),
            UnsolvedEquation::new(2, 1, 0xFF, 1),
            UnsolvedEquation::new(3, 9, Operator::Subtract as u8, 4),
        ]);

        let mut stream = MockStream::new(bytes);
        handle_connection(&mut stream).unwrap();

        let mut reply = Cursor::new(stream.output);
        ConnectionHeader::decode(&mut reply).unwrap();
        let batch = SolvedBatch::decode(&mut reply, Framing::Network).unwrap();

        assert_eq!(batch.records[0].value, 42);
        assert!(batch.records[1].is_failed());
        assert_eq!(batch.records[2].value, 5);
    }

    #[test]
    fn bad_header_size_answered_with_blanked_echo() {
        let mut header = ConnectionHeader::new("batch.equ", 0);
        header.header_size = 40;
        let mut bytes = Vec::new();
        header.encode(&mut bytes).unwrap();

        let mut stream = MockStream::new(bytes);
        let err = handle_connection(&mut stream).unwrap_err();
        assert!(matches!(err, ProtocolError::HeaderSizeMismatch { .. }));

        assert_eq!(stream.output.len(), HEADER_SIZE as usize);
        let echo = ConnectionHeader::decode(&mut Cursor::new(stream.output)).unwrap();
        assert_eq!(echo.name_len, 0);
        assert_eq!(echo.file_name(), "");
    }

    #[test]
    fn oversized_name_len_rejected() {
        let mut header = ConnectionHeader::new("batch.equ", 0);
        header.name_len = 33;
        let mut bytes = Vec::new();
        header.encode(&mut bytes).unwrap();

        let mut stream = MockStream::new(bytes);
        let err = handle_connection(&mut stream).unwrap_err();
        assert!(matches!(err, ProtocolError::NameTooLong { declared: 33, .. }));
    }

    #[test]
    fn truncated_request_sends_nothing() {
        let mut bytes = request(vec![UnsolvedEquation::new(1, 1, Operator::Add as u8, 1)]);
        bytes.truncate(bytes.len() - 9);

        let mut stream = MockStream::new(bytes);
        let err = handle_connection(&mut stream).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
        assert!(stream.output.is_empty());
    }

    #[test]
    fn wrong_magic_sends_nothing() {
        let mut bytes = request(vec![UnsolvedEquation::new(1, 1, Operator::Add as u8, 1)]);
        // Corrupt the magic tag just past the connection header.
        bytes[HEADER_SIZE as usize] = 0x00;

        let mut stream = MockStream::new(bytes);
        let err = handle_connection(&mut stream).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic(_)));
        assert!(stream.output.is_empty());
    }
}
