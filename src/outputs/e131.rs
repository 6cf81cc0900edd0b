//! E1.31 (streaming ACN) sender.
//!
//! Maps frame buffer pixels onto DMX slots of one or more universes and
//! sends one E1.31 data packet per universe per frame to a single receiver
//! host. Mappings that target the same universe share a packet.

use crate::config::{ChannelMapping, E131Descriptor, DMX_UNIVERSE_SLOTS};
use crate::error::{PixelWeaveError, Result};
use crate::types::{FrameBuffer, BLACK};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// ACN packet identifier that opens every root layer
const ACN_PACKET_IDENTIFIER: [u8; 12] = *b"ASC-E1.17\0\0\0";
const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
const SOURCE_NAME_LEN: usize = 64;

/// Offset of the framing layer
const FRAMING_LAYER_OFFSET: usize = 38;
/// Offset of the DMP layer
const DMP_LAYER_OFFSET: usize = 115;
/// Header bytes before the first DMX slot (including the start code)
pub const E131_HEADER_LEN: usize = 126;

/// Per-sender fields repeated in every packet
#[derive(Debug, Clone)]
pub struct PacketHeader {
    /// Component identifier (a UUID)
    pub cid: [u8; 16],
    /// Source name, truncated to 63 bytes
    pub source_name: String,
    /// Source priority
    pub priority: u8,
}

/// Encode one E1.31 data packet into `buf`, replacing its contents.
///
/// `slots` is the DMX payload after the start code (at most 512 bytes).
pub fn encode_data_packet(
    buf: &mut Vec<u8>,
    header: &PacketHeader,
    universe: u16,
    sequence: u8,
    slots: &[u8],
) {
    debug_assert!(slots.len() <= DMX_UNIVERSE_SLOTS);
    let total = E131_HEADER_LEN + slots.len();
    buf.clear();
    buf.reserve(total);

    // Root layer
    buf.extend_from_slice(&0x0010u16.to_be_bytes()); // preamble size
    buf.extend_from_slice(&0x0000u16.to_be_bytes()); // post-amble size
    buf.extend_from_slice(&ACN_PACKET_IDENTIFIER);
    buf.extend_from_slice(&flags_and_length(total - 16));
    buf.extend_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());
    buf.extend_from_slice(&header.cid);

    // Framing layer
    debug_assert_eq!(buf.len(), FRAMING_LAYER_OFFSET);
    buf.extend_from_slice(&flags_and_length(total - FRAMING_LAYER_OFFSET));
    buf.extend_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
    let mut name = [0u8; SOURCE_NAME_LEN];
    let name_bytes = header.source_name.as_bytes();
    let name_len = name_bytes.len().min(SOURCE_NAME_LEN - 1);
    name[..name_len].copy_from_slice(&name_bytes[..name_len]);
    buf.extend_from_slice(&name);
    buf.push(header.priority);
    buf.extend_from_slice(&0u16.to_be_bytes()); // synchronization address
    buf.push(sequence);
    buf.push(0); // options
    buf.extend_from_slice(&universe.to_be_bytes());

    // DMP layer
    debug_assert_eq!(buf.len(), DMP_LAYER_OFFSET);
    buf.extend_from_slice(&flags_and_length(total - DMP_LAYER_OFFSET));
    buf.push(VECTOR_DMP_SET_PROPERTY);
    buf.push(0xa1); // address type & data type
    buf.extend_from_slice(&0u16.to_be_bytes()); // first property address
    buf.extend_from_slice(&1u16.to_be_bytes()); // address increment
    buf.extend_from_slice(&((slots.len() + 1) as u16).to_be_bytes());
    buf.push(0x00); // DMX start code
    buf.extend_from_slice(slots);
}

fn flags_and_length(length: usize) -> [u8; 2] {
    (0x7000u16 | (length as u16 & 0x0fff)).to_be_bytes()
}

/// Derive a component identifier from the source name and destination.
///
/// Identical inputs give the same CID across runs of one build; it may
/// change when the toolchain's default hasher changes.
fn derive_cid(source_name: &str, destination: &SocketAddr) -> [u8; 16] {
    let mut cid = [0u8; 16];
    for (half, salt) in cid.chunks_exact_mut(8).zip([0x5eu8, 0xa1]) {
        let mut hasher = DefaultHasher::new();
        salt.hash(&mut hasher);
        source_name.hash(&mut hasher);
        destination.hash(&mut hasher);
        half.copy_from_slice(&hasher.finish().to_be_bytes());
    }
    cid
}

/// One universe's slot buffer and the pixel runs written into it
#[derive(Debug)]
struct Universe {
    number: u16,
    sequence: u8,
    runs: Vec<ChannelMapping>,
    slots: Vec<u8>,
}

impl Universe {
    fn fill(&mut self, frame: &FrameBuffer) {
        for run in &self.runs {
            let base = run.start_channel as usize - 1;
            for k in 0..run.pixel_count {
                let rgb = frame.get(run.first_pixel + k).unwrap_or(BLACK);
                let slot = base + k * 3;
                self.slots[slot..slot + 3].copy_from_slice(&rgb);
            }
        }
    }
}

/// E1.31 sink for one receiver host
pub struct E131Output {
    name: String,
    socket: UdpSocket,
    destination: SocketAddr,
    header: PacketHeader,
    universes: Vec<Universe>,
    packet: Vec<u8>,
    packets_sent: u64,
}

impl E131Output {
    /// Resolve the receiver, check the mapping against the model and bind
    /// a sending socket.
    pub async fn connect(descriptor: &E131Descriptor, pixel_count: usize) -> Result<Self> {
        let universes = plan_universes(&descriptor.channels, pixel_count)?;

        let destination = tokio::net::lookup_host((descriptor.host.as_str(), descriptor.port))
            .await?
            .next()
            .ok_or_else(|| {
                PixelWeaveError::output(
                    format!("e131:{}", descriptor.host),
                    "host did not resolve to any address",
                )
            })?;
        let bind_addr = if destination.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        let name = format!("e131:{}", destination);
        tracing::info!(
            "E1.31 output {} ready: universes {:?}",
            name,
            universes.iter().map(|u| u.number).collect::<Vec<_>>()
        );

        Ok(Self {
            header: PacketHeader {
                cid: derive_cid(&descriptor.source_name, &destination),
                source_name: descriptor.source_name.clone(),
                priority: descriptor.priority,
            },
            name,
            socket,
            destination,
            universes,
            packet: Vec::with_capacity(E131_HEADER_LEN + DMX_UNIVERSE_SLOTS),
            packets_sent: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver address
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Universe numbers in send order
    pub fn universes(&self) -> Vec<u16> {
        self.universes.iter().map(|u| u.number).collect()
    }

    /// Packets sent so far
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Send one packet per universe for `frame`
    pub async fn send_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        for universe in &mut self.universes {
            universe.fill(frame);
            encode_data_packet(
                &mut self.packet,
                &self.header,
                universe.number,
                universe.sequence,
                &universe.slots,
            );
            universe.sequence = universe.sequence.wrapping_add(1);

            self.socket
                .send_to(&self.packet, self.destination)
                .await
                .map_err(|e| {
                    PixelWeaveError::output(
                        &self.name,
                        format!("universe {} send failed: {}", universe.number, e),
                    )
                })?;
            self.packets_sent += 1;
        }
        Ok(())
    }
}

/// Group mappings by universe and size each universe's slot buffer
fn plan_universes(mappings: &[ChannelMapping], pixel_count: usize) -> Result<Vec<Universe>> {
    let mut by_universe: BTreeMap<u16, Vec<ChannelMapping>> = BTreeMap::new();
    for mapping in mappings {
        mapping.validate()?;
        let end = mapping.first_pixel.checked_add(mapping.pixel_count);
        if end.map_or(true, |end| end > pixel_count) {
            return Err(PixelWeaveError::ChannelMapping {
                universe: mapping.universe,
                message: format!(
                    "{} pixels from pixel {} are outside the model's {} pixels",
                    mapping.pixel_count, mapping.first_pixel, pixel_count
                ),
            });
        }
        by_universe.entry(mapping.universe).or_default().push(*mapping);
    }

    Ok(by_universe
        .into_iter()
        .map(|(number, runs)| {
            let slot_count = runs.iter().map(ChannelMapping::last_channel).max().unwrap_or(0);
            Universe {
                number,
                sequence: 0,
                runs,
                slots: vec![0u8; slot_count],
            }
        })
        .collect())
}
