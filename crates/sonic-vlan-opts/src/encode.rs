//! Netlink attribute encoding of VLAN options for dumps and notifications.
//!
//! Attributes use the standard TLV layout: a native-endian `u16` length
//! (header included), a native-endian `u16` type, the payload, and zero
//! padding to a 4-byte boundary.

use byteorder::{ByteOrder, NativeEndian};
use sonic_types::VlanId;

use crate::attrs::ids::{self, entry, gopts, tinfo};
use crate::callbacks::McastOps;
use crate::config::{Capabilities, VlanOptsConfig};
use crate::error::EncodeError;
use crate::types::VlanEntry;

pub const NLA_HDRLEN: usize = 4;
pub const NLA_ALIGNTO: usize = 4;
pub const NLA_F_NESTED: u16 = 1 << 15;
const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | (1 << 14));

pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Space taken by an attribute with `payload` bytes.
pub const fn nla_total_size(payload: usize) -> usize {
    nla_align(NLA_HDRLEN + payload)
}

/// Worst-case space of a 64-bit attribute, alignment pad included.
pub const fn nla_total_size_64bit(payload: usize) -> usize {
    nla_total_size(payload) + nla_total_size(0)
}

/// Position of an open nest, returned by [`AttrWriter::nest_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestMark(usize);

/// Sink for netlink attributes.
pub trait AttrWriter {
    fn put_u8(&mut self, ty: u16, value: u8) -> Result<(), EncodeError>;
    fn put_u16(&mut self, ty: u16, value: u16) -> Result<(), EncodeError>;
    fn put_u32(&mut self, ty: u16, value: u32) -> Result<(), EncodeError>;
    /// Puts a `u64`, preceded by a `pad_ty` attribute when needed to keep the
    /// payload 8-byte aligned.
    fn put_u64_64bit(&mut self, ty: u16, value: u64, pad_ty: u16) -> Result<(), EncodeError>;
    fn nest_start(&mut self, ty: u16) -> Result<NestMark, EncodeError>;
    fn nest_end(&mut self, mark: NestMark);
    /// Drops the nest and everything written into it.
    fn nest_cancel(&mut self, mark: NestMark);
}

/// Fixed-capacity attribute buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NlaBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl NlaBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve(&self, needed: usize) -> Result<(), EncodeError> {
        let available = self.capacity - self.buf.len();
        if needed > available {
            return Err(EncodeError { needed, available });
        }
        Ok(())
    }

    fn header(&mut self, len: usize, ty: u16) {
        let mut hdr = [0u8; NLA_HDRLEN];
        NativeEndian::write_u16(&mut hdr[..2], u16::try_from(len).unwrap_or(u16::MAX));
        NativeEndian::write_u16(&mut hdr[2..], ty);
        self.buf.extend_from_slice(&hdr);
    }

    fn put(&mut self, ty: u16, payload: &[u8]) -> Result<(), EncodeError> {
        let total = nla_total_size(payload.len());
        self.reserve(total)?;
        self.header(NLA_HDRLEN + payload.len(), ty);
        self.buf.extend_from_slice(payload);
        self.buf.resize(self.buf.len() + total - NLA_HDRLEN - payload.len(), 0);
        Ok(())
    }

    fn needs_64bit_pad(&self) -> bool {
        (self.buf.len() + NLA_HDRLEN) % 8 != 0
    }
}

impl AttrWriter for NlaBuffer {
    fn put_u8(&mut self, ty: u16, value: u8) -> Result<(), EncodeError> {
        self.put(ty, &[value])
    }

    fn put_u16(&mut self, ty: u16, value: u16) -> Result<(), EncodeError> {
        let mut payload = [0u8; 2];
        NativeEndian::write_u16(&mut payload, value);
        self.put(ty, &payload)
    }

    fn put_u32(&mut self, ty: u16, value: u32) -> Result<(), EncodeError> {
        let mut payload = [0u8; 4];
        NativeEndian::write_u32(&mut payload, value);
        self.put(ty, &payload)
    }

    fn put_u64_64bit(&mut self, ty: u16, value: u64, pad_ty: u16) -> Result<(), EncodeError> {
        let pad = if self.needs_64bit_pad() {
            nla_total_size(0)
        } else {
            0
        };
        self.reserve(pad + nla_total_size(8))?;
        if pad != 0 {
            self.put(pad_ty, &[])?;
        }
        let mut payload = [0u8; 8];
        NativeEndian::write_u64(&mut payload, value);
        self.put(ty, &payload)
    }

    fn nest_start(&mut self, ty: u16) -> Result<NestMark, EncodeError> {
        self.reserve(NLA_HDRLEN)?;
        let mark = NestMark(self.buf.len());
        self.header(0, ty | NLA_F_NESTED);
        Ok(mark)
    }

    fn nest_end(&mut self, mark: NestMark) {
        let len = u16::try_from(self.buf.len() - mark.0).unwrap_or(u16::MAX);
        NativeEndian::write_u16(&mut self.buf[mark.0..mark.0 + 2], len);
    }

    fn nest_cancel(&mut self, mark: NestMark) {
        self.buf.truncate(mark.0);
    }
}

/// Iterates over the attributes of an encoded block.
///
/// Yields the type with flag bits stripped and the payload. Stops at the
/// first truncated attribute.
pub fn iter_attrs(bytes: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    let mut rest = bytes;
    std::iter::from_fn(move || {
        if rest.len() < NLA_HDRLEN {
            return None;
        }
        let len = usize::from(NativeEndian::read_u16(&rest[..2]));
        let ty = NativeEndian::read_u16(&rest[2..4]) & NLA_TYPE_MASK;
        if len < NLA_HDRLEN || len > rest.len() {
            return None;
        }
        let payload = &rest[NLA_HDRLEN..len];
        rest = &rest[nla_align(len).min(rest.len())..];
        Some((ty, payload))
    })
}

/// Upper bound of what [`encode_per_vlan_options`] writes.
pub fn vlan_opts_nl_size(caps: Capabilities) -> usize {
    let mut size = nla_total_size(1) // STATE
        + nla_total_size(0) // TUNNEL_INFO
        + nla_total_size(4) // TUNNEL_INFO/ID
        + nla_total_size(1); // NEIGH_SUPPRESS, port VLANs only
    if caps.multicast {
        size += nla_total_size(1) // MCAST_ROUTER
            + nla_total_size(4) // MCAST_N_GROUPS
            + nla_total_size(4); // MCAST_MAX_GROUPS
    }
    size
}

/// Writes the per-VLAN options of `vlan`.
///
/// The tunnel nest only appears for a live mapping; group counters only for
/// port VLANs with snooping on. Neighbor suppression is a port option and is
/// left out for bridge VLANs.
pub fn encode_per_vlan_options<W: AttrWriter + ?Sized>(
    w: &mut W,
    vlan: &VlanEntry,
    is_port: bool,
    caps: Capabilities,
    mcast: &dyn McastOps,
) -> Result<(), EncodeError> {
    w.put_u8(entry::STATE, vlan.state.as_raw())?;

    if vlan.tunnel.has_dst {
        let nest = w.nest_start(entry::TUNNEL_INFO)?;
        if let Err(e) = w.put_u32(tinfo::ID, vlan.tunnel.tunnel_id) {
            w.nest_cancel(nest);
            return Err(e);
        }
        w.nest_end(nest);
    }

    if caps.multicast {
        w.put_u8(entry::MCAST_ROUTER, mcast.router_mode(vlan))?;
        if is_port && !vlan.port_mcast.disabled {
            w.put_u32(entry::MCAST_N_GROUPS, vlan.port_mcast.n_groups)?;
            w.put_u32(entry::MCAST_MAX_GROUPS, vlan.port_mcast.max_groups)?;
        }
    }

    if is_port {
        w.put_u8(entry::NEIGH_SUPPRESS, u8::from(vlan.neigh_suppress()))?;
    }
    Ok(())
}

/// Upper bound of what [`encode_global_options`] writes.
pub fn global_opts_nl_size(caps: Capabilities) -> usize {
    let mut size = nla_total_size(0) // GLOBAL_OPTIONS
        + nla_total_size(2) // ID
        + nla_total_size(2) // RANGE
        + nla_total_size(2); // MSTI
    if caps.multicast {
        size += nla_total_size(1) // MCAST_SNOOPING
            + nla_total_size(1) // MCAST_IGMP_VERSION
            + nla_total_size(4) // MCAST_LAST_MEMBER_CNT
            + nla_total_size(4) // MCAST_STARTUP_QUERY_CNT
            + nla_total_size(1) // MCAST_QUERIER
            + 6 * nla_total_size_64bit(8); // intervals
    }
    if caps.mld() {
        size += nla_total_size(1); // MCAST_MLD_VERSION
    }
    size
}

/// Writes the bridge-wide options of the range `opts.vid..=range_end` as
/// one `GLOBAL_OPTIONS` nest, removing the nest again on failure.
pub fn encode_global_options<W: AttrWriter + ?Sized>(
    w: &mut W,
    range_end: u16,
    opts: &VlanEntry,
    config: &VlanOptsConfig,
) -> Result<(), EncodeError> {
    let nest = w.nest_start(ids::VLANDB_GLOBAL_OPTIONS)?;
    match put_global_opts(w, range_end, opts, config) {
        Ok(()) => {
            w.nest_end(nest);
            Ok(())
        }
        Err(e) => {
            w.nest_cancel(nest);
            Err(e)
        }
    }
}

fn put_global_opts<W: AttrWriter + ?Sized>(
    w: &mut W,
    range_end: u16,
    opts: &VlanEntry,
    config: &VlanOptsConfig,
) -> Result<(), EncodeError> {
    let vid = opts.vid.get();
    w.put_u16(gopts::ID, vid)?;
    if range_end != 0 && vid < range_end && range_end <= VlanId::MAX {
        w.put_u16(gopts::RANGE, range_end)?;
    }

    let caps = config.capabilities;
    if caps.multicast {
        let ctx = &opts.mcast_ctx;
        w.put_u8(gopts::MCAST_SNOOPING, u8::from(opts.global_mcast_enabled()))?;
        w.put_u8(gopts::MCAST_IGMP_VERSION, ctx.igmp_version)?;
        w.put_u32(gopts::MCAST_LAST_MEMBER_CNT, ctx.last_member_count)?;
        w.put_u32(gopts::MCAST_STARTUP_QUERY_CNT, ctx.startup_query_count)?;
        w.put_u8(gopts::MCAST_QUERIER, u8::from(ctx.querier))?;

        let intervals = [
            (gopts::MCAST_LAST_MEMBER_INTVL, ctx.last_member_interval),
            (gopts::MCAST_MEMBERSHIP_INTVL, ctx.membership_interval),
            (gopts::MCAST_QUERIER_INTVL, ctx.querier_interval),
            (gopts::MCAST_QUERY_INTVL, ctx.query_interval),
            (gopts::MCAST_QUERY_RESPONSE_INTVL, ctx.query_response_interval),
            (gopts::MCAST_STARTUP_QUERY_INTVL, ctx.startup_query_interval),
        ];
        for (ty, ticks) in intervals {
            w.put_u64_64bit(ty, config.ticks_to_clock_t(ticks), gopts::PAD)?;
        }

        if caps.ipv6 {
            w.put_u8(gopts::MCAST_MLD_VERSION, ctx.mld_version)?;
        }
    }

    w.put_u16(gopts::MSTI, opts.msti)?;
    Ok(())
}
