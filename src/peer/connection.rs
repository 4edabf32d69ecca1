use super::extension::{self, ExtensionHandshake, MetadataMessage};
use super::{FailureReason, Handshake, PeerConfig, PeerMessage, SessionState, HANDSHAKE_LEN};
use crate::error::{Result, SwarmError};
use crate::piece;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Largest frame we accept. A 16 KiB block or a metadata piece is far
/// below this; anything bigger is a broken or hostile peer.
const MAX_MESSAGE_LEN: usize = 1 << 21;

/// One connection to a remote peer, driven through the download handshake
/// stages in order.
///
/// The stream type is generic so tests can script the remote side.
pub struct PeerConnection<S = TcpStream> {
    addr: SocketAddr,
    stream: S,
    state: SessionState,
    io_timeout: Duration,
    remote_id: [u8; 20],
    supports_extensions: bool,
    bitfield: Option<Vec<u8>>,
}

impl PeerConnection<TcpStream> {
    /// Connect to a peer and perform the handshake.
    ///
    /// When `extensions` is set the handshake advertises the extension
    /// protocol (needed for fetching metadata).
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        config: &PeerConfig,
        extensions: bool,
    ) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let stream = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SwarmError::ConnectionRejected(format!(
                    "failed to connect to {}: {}",
                    addr, e
                )))
            }
            Err(_) => {
                return Err(SwarmError::ConnectionRejected(format!(
                    "connecting to {} timed out after {:?}",
                    addr, config.connect_timeout
                )))
            }
        };

        Self::handshake(stream, addr, info_hash, config, extensions).await
    }
}

impl<S> PeerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the 68-byte handshake over an already-open stream.
    pub async fn handshake(
        stream: S,
        addr: SocketAddr,
        info_hash: [u8; 20],
        config: &PeerConfig,
        extensions: bool,
    ) -> Result<Self> {
        let mut conn = Self {
            addr,
            stream,
            state: SessionState::Connecting,
            io_timeout: config.io_timeout,
            remote_id: [0u8; 20],
            supports_extensions: false,
            bitfield: None,
        };

        let ours = if extensions {
            Handshake::with_extensions(info_hash, config.peer_id)
        } else {
            Handshake::new(info_hash, config.peer_id)
        };

        let result = conn.exchange_handshake(&ours).await;
        conn.settle(result)?;
        Ok(conn)
    }

    async fn exchange_handshake(&mut self, ours: &Handshake) -> Result<()> {
        let rejected = |e: SwarmError| SwarmError::ConnectionRejected(e.to_string());

        self.write_all(&ours.to_bytes()).await.map_err(rejected)?;
        self.state = SessionState::HandshakeSent;
        debug!("Sent handshake to {}", self.addr);

        let mut buf = [0u8; HANDSHAKE_LEN];
        self.read_exact(&mut buf).await.map_err(rejected)?;

        let theirs = Handshake::from_bytes(&buf)?;
        if theirs.info_hash != ours.info_hash {
            return Err(SwarmError::ProtocolViolation(format!(
                "{} answered for info hash {}",
                self.addr,
                hex::encode(theirs.info_hash)
            )));
        }

        self.remote_id = theirs.peer_id;
        self.supports_extensions = theirs.supports_extensions();
        self.state = SessionState::HandshakeVerified;

        info!(
            "Handshake with {} complete, peer id {}",
            self.addr,
            hex::encode(self.remote_id)
        );
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The id the peer sent in its handshake (not validated)
    pub fn remote_id(&self) -> &[u8; 20] {
        &self.remote_id
    }

    /// Whether the peer set the extension-protocol bit in its handshake
    pub fn supports_extensions(&self) -> bool {
        self.supports_extensions
    }

    pub fn bitfield(&self) -> Option<&[u8]> {
        self.bitfield.as_deref()
    }

    /// Mark the session failed because of `err` and hand the error back.
    pub fn fail(&mut self, err: SwarmError) -> SwarmError {
        warn!("Session with {} failed: {}", self.addr, err);
        self.state = SessionState::Failed(FailureReason::from(&err));
        err
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.fail(e))
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(self.io_timeout, self.stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SwarmError::Transport(e)),
            Err(_) => Err(SwarmError::Timeout(format!(
                "no data from {} within {:?}",
                self.addr, self.io_timeout
            ))),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match timeout(self.io_timeout, self.stream.write_all(buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SwarmError::Transport(e)),
            Err(_) => Err(SwarmError::Timeout(format!(
                "writing to {} stalled for {:?}",
                self.addr, self.io_timeout
            ))),
        }
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &PeerMessage) -> Result<()> {
        self.write_all(&message.to_bytes()).await?;
        debug!("Sent {} to {}", message.kind(), self.addr);
        Ok(())
    }

    /// Receive one length-prefixed message from the peer
    pub async fn receive_message(&mut self) -> Result<PeerMessage> {
        let mut length_buf = [0u8; 4];
        self.read_exact(&mut length_buf).await?;

        let length = u32::from_be_bytes(length_buf) as usize;
        if length > MAX_MESSAGE_LEN {
            return Err(SwarmError::ProtocolViolation(format!(
                "{} announced a {} byte message",
                self.addr, length
            )));
        }

        let mut body = vec![0u8; length];
        self.read_exact(&mut body).await?;

        let message = PeerMessage::from_body(&body)?;
        debug!("Received {} from {}", message.kind(), self.addr);
        Ok(message)
    }

    /// When the answer to something sent now has to have arrived
    fn deadline(&self) -> Instant {
        Instant::now() + self.io_timeout
    }

    /// Next message that is not a keep-alive.
    ///
    /// Keep-alives do not extend `deadline`; a peer that only ever sends
    /// those still times out.
    async fn next_message(&mut self, deadline: Instant) -> Result<PeerMessage> {
        loop {
            let message = match timeout_at(deadline, self.receive_message()).await {
                Ok(message) => message?,
                Err(_) => {
                    return Err(SwarmError::Timeout(format!(
                        "no answer from {} within {:?}",
                        self.addr, self.io_timeout
                    )))
                }
            };
            if message != PeerMessage::KeepAlive {
                return Ok(message);
            }
        }
    }

    /// Bitfield intake, then interested/unchoke. After this the peer
    /// accepts block requests.
    pub async fn prepare(&mut self) -> Result<()> {
        let result = self.prepare_inner().await;
        self.settle(result)
    }

    async fn prepare_inner(&mut self) -> Result<()> {
        self.state = SessionState::AwaitingBitfield;
        match self.next_message(self.deadline()).await? {
            PeerMessage::Bitfield { bitfield } => self.bitfield = Some(bitfield),
            other => {
                return Err(SwarmError::ProtocolViolation(format!(
                    "expected bitfield from {}, got {}",
                    self.addr,
                    other.kind()
                )))
            }
        }

        self.send_message(&PeerMessage::Interested).await?;
        self.state = SessionState::Interested;

        match self.next_message(self.deadline()).await? {
            PeerMessage::Unchoke => {
                self.state = SessionState::Unchoked;
                Ok(())
            }
            other => Err(SwarmError::ProtocolViolation(format!(
                "expected unchoke from {}, got {}",
                self.addr,
                other.kind()
            ))),
        }
    }

    /// Fetch one whole piece, block by block, one request in flight at a time.
    ///
    /// The bytes are not verified here.
    pub async fn download_piece(&mut self, index: u32, size: u32) -> Result<Vec<u8>> {
        let result = self.download_piece_inner(index, size).await;
        self.settle(result)
    }

    async fn download_piece_inner(&mut self, index: u32, size: u32) -> Result<Vec<u8>> {
        if !matches!(
            self.state,
            SessionState::Unchoked | SessionState::PieceComplete
        ) {
            return Err(SwarmError::ProtocolViolation(format!(
                "cannot request from {} in state {:?}",
                self.addr, self.state
            )));
        }

        self.state = SessionState::Requesting;
        let mut piece = vec![0u8; size as usize];

        for block in piece::block_requests(index, size) {
            self.send_message(&PeerMessage::Request { block }).await?;
            self.state = SessionState::AwaitingBlock;

            match self.next_message(self.deadline()).await? {
                PeerMessage::Piece {
                    piece_index,
                    offset,
                    data,
                } if piece_index == block.piece_index
                    && offset == block.offset
                    && data.len() == block.length as usize =>
                {
                    let start = offset as usize;
                    piece[start..start + data.len()].copy_from_slice(&data);
                }
                PeerMessage::Piece {
                    piece_index,
                    offset,
                    data,
                } => {
                    return Err(SwarmError::ProtocolViolation(format!(
                        "asked {} for {:?}, got piece {} offset {} with {} bytes",
                        self.addr,
                        block,
                        piece_index,
                        offset,
                        data.len()
                    )))
                }
                other => {
                    return Err(SwarmError::ProtocolViolation(format!(
                        "expected piece from {}, got {}",
                        self.addr,
                        other.kind()
                    )))
                }
            }

            self.state = SessionState::Requesting;
        }

        self.state = SessionState::PieceComplete;
        debug!("Piece {} ({} bytes) received from {}", index, size, self.addr);
        Ok(piece)
    }

    /// Exchange extension handshakes and return the peer's.
    pub async fn extension_handshake(&mut self) -> Result<ExtensionHandshake> {
        let result = self.extension_handshake_inner().await;
        self.settle(result)
    }

    async fn extension_handshake_inner(&mut self) -> Result<ExtensionHandshake> {
        if !self.supports_extensions {
            return Err(SwarmError::NoExtensionSupport);
        }

        self.send_message(&PeerMessage::Extended {
            id: extension::HANDSHAKE_ID,
            payload: ExtensionHandshake::local().encode(),
        })
        .await?;

        let deadline = self.deadline();
        loop {
            match self.next_message(deadline).await? {
                PeerMessage::Extended { id, payload } if id == extension::HANDSHAKE_ID => {
                    let theirs = ExtensionHandshake::decode(&payload)?;
                    debug!("Extension handshake from {}: {:?}", self.addr, theirs);
                    return Ok(theirs);
                }
                // Peers usually announce what they have before the extension handshake
                PeerMessage::Bitfield { bitfield } => self.bitfield = Some(bitfield),
                PeerMessage::Have { .. } => {}
                other => {
                    return Err(SwarmError::ProtocolViolation(format!(
                        "expected extension handshake from {}, got {}",
                        self.addr,
                        other.kind()
                    )))
                }
            }
        }
    }

    /// Ask for one metadata piece, addressed to the peer's `ut_metadata` id,
    /// and wait for the answer addressed to ours.
    pub async fn request_metadata(
        &mut self,
        peer_ut_metadata: u8,
        piece: u32,
    ) -> Result<MetadataMessage> {
        let result = self.request_metadata_inner(peer_ut_metadata, piece).await;
        self.settle(result)
    }

    async fn request_metadata_inner(
        &mut self,
        peer_ut_metadata: u8,
        piece: u32,
    ) -> Result<MetadataMessage> {
        self.send_message(&PeerMessage::Extended {
            id: peer_ut_metadata,
            payload: MetadataMessage::Request { piece }.encode(),
        })
        .await?;

        let deadline = self.deadline();
        loop {
            match self.next_message(deadline).await? {
                PeerMessage::Extended { id, payload } if id == extension::LOCAL_UT_METADATA_ID => {
                    match MetadataMessage::decode(&payload)? {
                        // The peer asking us for metadata; we have none to give
                        MetadataMessage::Request { .. } => continue,
                        answer => return Ok(answer),
                    }
                }
                PeerMessage::Extended { .. }
                | PeerMessage::Bitfield { .. }
                | PeerMessage::Have { .. } => {}
                other => {
                    return Err(SwarmError::ProtocolViolation(format!(
                        "expected metadata from {}, got {}",
                        self.addr,
                        other.kind()
                    )))
                }
            }
        }
    }
}
