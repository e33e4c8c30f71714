//! Single-VLAN option mutators.
//!
//! Each mutator validates its preconditions, applies one option and reports
//! whether the VLAN actually changed. Errors leave earlier mutations in
//! place.

use sonic_types::VlanId;
use tracing::debug;

use crate::attrs::{GlobalOptsAttrs, TunnelCmd, TunnelInfoAttrs, VlanEntryAttrs};
use crate::callbacks::{McastOps, TunnelTable, VlanGroup};
use crate::config::VlanOptsConfig;
use crate::error::{VlanOptsError, VlanOptsResult};
use crate::types::{BridgeCtx, PortInfo, StpState, VlanEntry, VlanPrivFlags};

/// Longest query and startup query interval accepted, in seconds.
const MCAST_QUERY_INTVL_MAX_SECS: u64 = 86_400;

/// Port side of a request: the port and its tunnel index.
pub struct PortCtx<'a> {
    pub info: &'a PortInfo,
    pub tunnels: &'a mut dyn TunnelTable,
}

impl<'a> PortCtx<'a> {
    pub fn new(info: &'a PortInfo, tunnels: &'a mut dyn TunnelTable) -> Self {
        Self { info, tunnels }
    }
}

/// Read-only context shared by the mutators of one request.
#[derive(Clone, Copy)]
pub struct OptsEnv<'a> {
    pub bridge: &'a BridgeCtx,
    pub config: &'a VlanOptsConfig,
    pub mcast: &'a dyn McastOps,
}

fn update<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Sets the STP state of `vid`.
///
/// The group's pvid state is updated before the entry so both move
/// together.
pub fn apply_state<G: VlanGroup + ?Sized>(
    group: &mut G,
    vid: VlanId,
    state: u8,
    bridge: &BridgeCtx,
) -> VlanOptsResult<bool> {
    let new_state = StpState::from_raw(state)
        .ok_or_else(|| VlanOptsError::invalid(format!("Invalid vlan state {}", state)))?;

    if bridge.is_kernel_stp_active() {
        return Err(VlanOptsError::busy(
            "Can't modify vlan state when using kernel STP",
        ));
    }
    if bridge.mst_enabled {
        return Err(VlanOptsError::busy(
            "Can't modify vlan state directly when MST is enabled",
        ));
    }

    let current = group
        .get(vid)
        .map(|entry| entry.state)
        .ok_or_else(|| VlanOptsError::not_found(format!("Vlan {} doesn't exist", vid)))?;
    if current == new_state {
        return Ok(false);
    }

    if group.pvid() == Some(vid) {
        group.set_pvid_state(new_state);
    }
    if let Some(entry) = group.get_mut(vid) {
        entry.state = new_state;
    }
    debug!(vid = %vid, from = current.as_str(), to = new_state.as_str(), "vlan state changed");
    Ok(true)
}

/// Maps or unmaps `entry` to a tunnel id.
///
/// For a set, `tinfo.id` is the tunnel id of `base_vid`; every later VLAN
/// gets the id shifted by its distance from `base_vid`.
pub fn apply_tunnel(
    port: Option<&mut PortCtx<'_>>,
    entry: &mut VlanEntry,
    base_vid: VlanId,
    tinfo: &TunnelInfoAttrs,
) -> VlanOptsResult<bool> {
    let port = port.ok_or_else(|| {
        VlanOptsError::invalid("Can't modify tunnel mapping of non-port vlans")
    })?;
    if !port.info.vlan_tunnel {
        return Err(VlanOptsError::invalid("Port doesn't have tunnel flag set"));
    }

    let raw_cmd = tinfo
        .cmd
        .ok_or_else(|| VlanOptsError::not_found("Missing tunnel command attribute"))?;
    let (cmd, tunnel_id) = match TunnelCmd::from_raw(raw_cmd) {
        Some(TunnelCmd::Set) => {
            let base_id = tinfo
                .id
                .ok_or_else(|| VlanOptsError::not_found("Missing tunnel id attribute"))?;
            let offset = entry.vid.offset_from(base_vid).ok_or_else(|| {
                VlanOptsError::invalid(format!(
                    "Vlan {} is below tunnel range start {}",
                    entry.vid, base_vid
                ))
            })?;
            let tunnel_id = base_id.checked_add(u32::from(offset)).ok_or_else(|| {
                VlanOptsError::invalid(format!(
                    "Tunnel id {} + {} overflows",
                    base_id, offset
                ))
            })?;
            (TunnelCmd::Set, tunnel_id)
        }
        Some(TunnelCmd::Delete) => (TunnelCmd::Delete, 0),
        None => {
            return Err(VlanOptsError::invalid(format!(
                "Unsupported tunnel command {}",
                raw_cmd
            )))
        }
    };

    let changed = port.tunnels.apply(port.info, entry, cmd, tunnel_id)?;
    if changed {
        debug!(vid = %entry.vid, ?cmd, tunnel_id, port = %port.info.name, "tunnel mapping changed");
    }
    Ok(changed)
}

fn apply_mcast_max_groups(
    port: Option<&PortCtx<'_>>,
    entry: &mut VlanEntry,
    max_groups: u32,
) -> VlanOptsResult<bool> {
    if port.is_none() {
        return Err(VlanOptsError::invalid(
            "Can't set mcast_max_groups for non-port vlans",
        ));
    }
    if entry.port_mcast.disabled {
        return Err(VlanOptsError::invalid(
            "Multicast snooping disabled on this VLAN",
        ));
    }
    Ok(update(&mut entry.port_mcast.max_groups, max_groups))
}

fn apply_neigh_suppress(
    port: Option<&PortCtx<'_>>,
    entry: &mut VlanEntry,
    enabled: bool,
) -> VlanOptsResult<bool> {
    if port.is_none() {
        return Err(VlanOptsError::invalid(
            "Can't set neigh_suppress for non-port vlans",
        ));
    }
    if entry.neigh_suppress() == enabled {
        return Ok(false);
    }
    entry
        .priv_flags
        .set(VlanPrivFlags::NEIGH_SUPPRESS_ENABLED, enabled);
    Ok(true)
}

/// Applies every option of `attrs` to `vid`, stopping at the first error.
///
/// Returns true when any option changed the VLAN.
pub fn process_one<G: VlanGroup + ?Sized>(
    env: &OptsEnv<'_>,
    group: &mut G,
    mut port: Option<&mut PortCtx<'_>>,
    vid: VlanId,
    base_vid: VlanId,
    attrs: &VlanEntryAttrs,
) -> VlanOptsResult<bool> {
    let mut changed = false;

    if let Some(state) = attrs.state {
        changed |= apply_state(group, vid, state, env.bridge)?;
    }

    let entry = group
        .get_mut(vid)
        .ok_or_else(|| VlanOptsError::not_found(format!("Vlan {} doesn't exist", vid)))?;

    if let Some(tinfo) = &attrs.tunnel_info {
        changed |= apply_tunnel(port.as_deref_mut(), entry, base_vid, tinfo)?;
    }

    if env.config.capabilities.multicast {
        if let Some(mode) = attrs.mcast_router {
            changed |= env.mcast.set_router(entry, mode)?;
        }
        if let Some(max_groups) = attrs.mcast_max_groups {
            changed |= apply_mcast_max_groups(port.as_deref(), entry, max_groups)?;
        }
    } else if attrs.mcast_router.is_some() || attrs.mcast_max_groups.is_some() {
        debug!(vid = %vid, "multicast support disabled, ignoring multicast options");
    }

    if let Some(enabled) = attrs.neigh_suppress {
        changed |= apply_neigh_suppress(port.as_deref(), entry, enabled)?;
    }

    Ok(changed)
}

fn clamp_query_interval(config: &VlanOptsConfig, vid: VlanId, name: &str, ticks: u64) -> u64 {
    let min = config.secs_to_ticks(1);
    let max = config.secs_to_ticks(MCAST_QUERY_INTVL_MAX_SECS);
    let clamped = ticks.clamp(min, max);
    if clamped != ticks {
        debug!(vid = %vid, name, requested = ticks, clamped, "interval clamped");
    }
    clamped
}

/// Applies bridge-wide options of `gopts` to one bridge VLAN.
pub fn process_global_one(
    env: &OptsEnv<'_>,
    entry: &mut VlanEntry,
    gopts: &GlobalOptsAttrs,
) -> VlanOptsResult<bool> {
    let config = env.config;
    let caps = config.capabilities;
    let vid = entry.vid;
    let mut changed = false;

    if caps.multicast {
        if let Some(enabled) = gopts.mcast_snooping {
            if entry.global_mcast_enabled() != enabled {
                entry
                    .priv_flags
                    .set(VlanPrivFlags::GLOBAL_MCAST_ENABLED, enabled);
                changed = true;
            }
        }

        let ctx = &mut entry.mcast_ctx;
        if let Some(version) = gopts.mcast_igmp_version {
            if !matches!(version, 2 | 3) {
                return Err(VlanOptsError::invalid(format!(
                    "Invalid IGMP version {}",
                    version
                )));
            }
            changed |= update(&mut ctx.igmp_version, version);
        }
        if let Some(count) = gopts.mcast_last_member_cnt {
            changed |= update(&mut ctx.last_member_count, count);
        }
        if let Some(count) = gopts.mcast_startup_query_cnt {
            changed |= update(&mut ctx.startup_query_count, count);
        }
        if let Some(clock) = gopts.mcast_last_member_intvl {
            changed |= update(&mut ctx.last_member_interval, config.clock_t_to_ticks(clock));
        }
        if let Some(clock) = gopts.mcast_membership_intvl {
            changed |= update(&mut ctx.membership_interval, config.clock_t_to_ticks(clock));
        }
        if let Some(clock) = gopts.mcast_querier_intvl {
            changed |= update(&mut ctx.querier_interval, config.clock_t_to_ticks(clock));
        }
        if let Some(clock) = gopts.mcast_query_intvl {
            let ticks = clamp_query_interval(config, vid, "query", config.clock_t_to_ticks(clock));
            changed |= update(&mut ctx.query_interval, ticks);
        }
        if let Some(clock) = gopts.mcast_query_response_intvl {
            changed |= update(
                &mut ctx.query_response_interval,
                config.clock_t_to_ticks(clock),
            );
        }
        if let Some(clock) = gopts.mcast_startup_query_intvl {
            let ticks = clamp_query_interval(
                config,
                vid,
                "startup_query",
                config.clock_t_to_ticks(clock),
            );
            changed |= update(&mut ctx.startup_query_interval, ticks);
        }
        if let Some(querier) = gopts.mcast_querier {
            changed |= update(&mut ctx.querier, querier);
        }
        if let Some(version) = gopts.mcast_mld_version {
            if caps.ipv6 {
                if !matches!(version, 1 | 2) {
                    return Err(VlanOptsError::invalid(format!(
                        "Invalid MLD version {}",
                        version
                    )));
                }
                changed |= update(&mut ctx.mld_version, version);
            } else {
                debug!(vid = %vid, "IPv6 support disabled, ignoring MLD version");
            }
        }
    } else if has_mcast_opts(gopts) {
        debug!(vid = %vid, "multicast support disabled, ignoring multicast options");
    }

    if let Some(msti) = gopts.msti {
        if msti > VlanId::MAX {
            return Err(VlanOptsError::invalid(format!("Invalid MST instance {}", msti)));
        }
        changed |= update(&mut entry.msti, msti);
    }

    Ok(changed)
}

fn has_mcast_opts(gopts: &GlobalOptsAttrs) -> bool {
    let without_msti = GlobalOptsAttrs {
        msti: None,
        ..gopts.clone()
    };
    !without_msti.is_empty()
}
