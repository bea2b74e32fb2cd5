//! Protocol instances and their configuration generations
//!
//! A protocol encodes and decodes payloads for one wire version. Each time
//! the configuration selects a different version, a new protocol instance is
//! installed as a new *generation*. Messages built against an older
//! generation keep an `Arc` to it, so the registry retires the old instance
//! instead of dropping it and only reaps it once nothing references it and a
//! grace period has passed.

use crate::core::sync::lock_or_recover;
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::transport::error::{TransportError, TransportResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Retired generations are kept at least this long by default
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(300);

const VERSION_HEADER_LEN: usize = 4;

/// Wire codec for one protocol version
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    /// Encode an internal payload for the wire
    fn encode(&self, payload: &[u8]) -> TransportResult<Vec<u8>>;

    /// Decode a wire frame into an internal payload
    fn decode(&self, frame: &[u8]) -> TransportResult<Vec<u8>>;
}

/// Builds protocol instances for a requested wire version
pub trait ProtocolFactory: Send + Sync {
    fn create(&self, version: u32) -> TransportResult<Box<dyn Protocol>>;
}

/// Payload framing with a 4-byte big-endian version header
///
/// # Example
///
/// ```rust
/// use storcomm::transport::{FramedProtocol, Protocol};
///
/// let protocol = FramedProtocol::new(2);
/// let frame = protocol.encode(b"doc").unwrap();
/// assert_eq!(&frame[..4], &[0, 0, 0, 2]);
/// assert_eq!(protocol.decode(&frame).unwrap(), b"doc".to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct FramedProtocol {
    version: u32,
}

impl FramedProtocol {
    pub fn new(version: u32) -> Self {
        Self { version }
    }
}

impl Protocol for FramedProtocol {
    fn name(&self) -> &str {
        "framed"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn encode(&self, payload: &[u8]) -> TransportResult<Vec<u8>> {
        let mut frame = Vec::with_capacity(VERSION_HEADER_LEN + payload.len());
        frame.extend_from_slice(&self.version.to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> TransportResult<Vec<u8>> {
        if frame.len() < VERSION_HEADER_LEN {
            return Err(TransportError::MalformedFrame {
                reason: format!(
                    "frame of {} bytes is shorter than the version header",
                    frame.len()
                ),
            });
        }
        let (header, body) = frame.split_at(VERSION_HEADER_LEN);
        let found = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if found != self.version {
            return Err(TransportError::VersionMismatch {
                expected: self.version,
                found,
            });
        }
        Ok(body.to_vec())
    }
}

/// Factory for [`FramedProtocol`] covering versions `1..=max_version`
#[derive(Debug, Clone)]
pub struct FramedProtocolFactory {
    max_version: u32,
}

impl FramedProtocolFactory {
    pub fn new(max_version: u32) -> Self {
        Self { max_version }
    }
}

impl Default for FramedProtocolFactory {
    fn default() -> Self {
        Self::new(crate::core::version::default_wire_protocol_version())
    }
}

impl ProtocolFactory for FramedProtocolFactory {
    fn create(&self, version: u32) -> TransportResult<Box<dyn Protocol>> {
        if version == 0 || version > self.max_version {
            return Err(TransportError::UnsupportedVersion { version });
        }
        Ok(Box::new(FramedProtocol::new(version)))
    }
}

/// A protocol instance tagged with the configuration generation that
/// installed it
pub struct ProtocolGeneration {
    generation: u64,
    protocol: Box<dyn Protocol>,
}

impl ProtocolGeneration {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn version(&self) -> u32 {
        self.protocol.version()
    }

    pub fn name(&self) -> &str {
        self.protocol.name()
    }

    pub fn encode(&self, payload: &[u8]) -> TransportResult<Vec<u8>> {
        self.protocol.encode(payload)
    }

    pub fn decode(&self, frame: &[u8]) -> TransportResult<Vec<u8>> {
        self.protocol.decode(frame)
    }
}

impl fmt::Debug for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolGeneration")
            .field("generation", &self.generation)
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

impl fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} (generation {})",
            self.name(),
            self.version(),
            self.generation
        )
    }
}

struct RetiredGeneration {
    retired_at: Instant,
    retired_wall: DateTime<Utc>,
    generation: Arc<ProtocolGeneration>,
}

struct RegistryState {
    current: Arc<ProtocolGeneration>,
    retired: Vec<RetiredGeneration>,
    next_generation: u64,
    grace_period: Duration,
}

/// Current protocol generation plus the retired ones still kept alive
pub struct ProtocolRegistry {
    state: Mutex<RegistryState>,
    clock: Arc<dyn TimeProvider>,
}

impl ProtocolRegistry {
    /// Registry starting at generation 1 with the system clock
    pub fn new(protocol: Box<dyn Protocol>) -> Self {
        Self::with_clock(protocol, DEFAULT_GRACE_PERIOD, Arc::new(SystemTimeProvider))
    }

    pub fn with_clock(
        protocol: Box<dyn Protocol>,
        grace_period: Duration,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                current: Arc::new(ProtocolGeneration {
                    generation: 1,
                    protocol,
                }),
                retired: Vec::new(),
                next_generation: 2,
                grace_period,
            }),
            clock,
        }
    }

    /// The generation new messages are built against
    pub fn current(&self) -> Arc<ProtocolGeneration> {
        Arc::clone(&lock_or_recover(&self.state, "protocol registry").current)
    }

    /// Install a new protocol, retiring the current generation
    pub fn install(&self, protocol: Box<dyn Protocol>) -> Arc<ProtocolGeneration> {
        let retired_at = self.clock.now();
        let retired_wall = DateTime::<Utc>::from(self.clock.system_time());

        let mut state = lock_or_recover(&self.state, "protocol registry");
        let installed = Arc::new(ProtocolGeneration {
            generation: state.next_generation,
            protocol,
        });
        state.next_generation += 1;

        let previous = std::mem::replace(&mut state.current, Arc::clone(&installed));
        log::info!("Retiring protocol {} in favour of {}", previous, installed);
        state.retired.push(RetiredGeneration {
            retired_at,
            retired_wall,
            generation: previous,
        });

        installed
    }

    /// Find the generation that speaks wire `version`
    ///
    /// The current generation wins; otherwise the newest retained retired
    /// generation with that version is returned.
    pub fn for_version(&self, version: u32) -> Option<Arc<ProtocolGeneration>> {
        let state = lock_or_recover(&self.state, "protocol registry");
        if state.current.version() == version {
            return Some(Arc::clone(&state.current));
        }
        state
            .retired
            .iter()
            .rev()
            .find(|retired| retired.generation.version() == version)
            .map(|retired| Arc::clone(&retired.generation))
    }

    pub fn set_grace_period(&self, grace_period: Duration) {
        lock_or_recover(&self.state, "protocol registry").grace_period = grace_period;
    }

    pub fn grace_period(&self) -> Duration {
        lock_or_recover(&self.state, "protocol registry").grace_period
    }

    pub fn retired_count(&self) -> usize {
        lock_or_recover(&self.state, "protocol registry").retired.len()
    }

    /// Generation numbers of the retained retired generations, oldest first
    pub fn retired_generations(&self) -> Vec<u64> {
        lock_or_recover(&self.state, "protocol registry")
            .retired
            .iter()
            .map(|retired| retired.generation.generation())
            .collect()
    }

    /// Drop retired generations that are unreferenced and past the grace
    /// period; returns how many were removed
    pub fn reap(&self) -> usize {
        let now = self.clock.now();
        let mut state = lock_or_recover(&self.state, "protocol registry");
        let grace_period = state.grace_period;
        let before = state.retired.len();

        state.retired.retain(|retired| {
            let unreferenced = Arc::strong_count(&retired.generation) == 1;
            let expired = now.saturating_duration_since(retired.retired_at) >= grace_period;
            if unreferenced && expired {
                log::debug!(
                    "Reaping protocol {} retired at {}",
                    retired.generation,
                    retired.retired_wall.to_rfc3339()
                );
                false
            } else {
                true
            }
        });

        before - state.retired.len()
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_or_recover(&self.state, "protocol registry");
        f.debug_struct("ProtocolRegistry")
            .field("current", &state.current)
            .field("retired", &state.retired.len())
            .field("grace_period", &state.grace_period)
            .finish()
    }
}
