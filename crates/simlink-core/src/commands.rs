//! Reference command catalogue exchanged with the simulation.
//!
//! The protocol engine treats commands as opaque typed values; this module is
//! one concrete catalogue built on top of it, used by `simlink-monitor` and by
//! the integration tests.  Each variant has a fixed [`CommandId`]:
//!
//! | id       | variant         | payload                                                   |
//! |----------|-----------------|-----------------------------------------------------------|
//! | `0x0101` | `AssignMission` | uav_id: string, mission_id: string, waypoints: list<vec3> |
//! | `0x0102` | `GroupUavs`     | group_name: string?, members: list<string>?               |
//! | `0x0201` | `EntityState`   | entity_id: i32, position: vec3, heading_deg: f32, alive: bool |
//! | `0x0202` | `SimClock`      | tick: u64, sim_time_s: f64                                |
//! | `0x0301` | `StatusText`    | text: string?                                             |
//! | `0x0400` | `Batch`         | list<nested command>?                                     |
//!
//! A nested command is written as `[command_id:u16][payload_len:i32][payload]`
//! so that a batch can be decoded without knowing the size of each variant.
//! Batches may contain batches, at most [`MAX_BATCH_DEPTH`] levels below the
//! outermost one.

use serde::Serialize;

use crate::protocol::command::{Command, CommandFactory, CommandId};
use crate::protocol::wire::{
    read_bool, read_bytes, read_f32, read_f64, read_i32, read_list, read_string,
    read_string_list, read_u16, read_u64, read_vec3, write_bool, write_bytes, write_f32,
    write_f64, write_i32, write_list, write_string, write_string_list, write_u16, write_u64,
    write_vec3, Vec3, WireError,
};
use tracing::warn;

pub const ASSIGN_MISSION: CommandId = CommandId(0x0101);
pub const GROUP_UAVS: CommandId = CommandId(0x0102);
pub const ENTITY_STATE: CommandId = CommandId(0x0201);
pub const SIM_CLOCK: CommandId = CommandId(0x0202);
pub const STATUS_TEXT: CommandId = CommandId(0x0301);
pub const BATCH: CommandId = CommandId(0x0400);

/// Deepest nesting of a `Batch` inside another `Batch` that decoding accepts.
pub const MAX_BATCH_DEPTH: usize = 16;

/// Commands understood by the visualization client and the simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimCommand {
    /// Assigns a mission (an ordered list of waypoints) to one UAV.
    AssignMission {
        uav_id: String,
        mission_id: String,
        waypoints: Vec<Vec3>,
    },
    /// Groups UAVs under a name.  `None` members clears the group.
    GroupUavs {
        group_name: Option<String>,
        members: Option<Vec<String>>,
    },
    /// Periodic kinematic update for one simulated entity.
    EntityState {
        entity_id: i32,
        position: Vec3,
        heading_deg: f32,
        alive: bool,
    },
    SimClock {
        tick: u64,
        sim_time_s: f64,
    },
    StatusText {
        text: Option<String>,
    },
    /// Several commands delivered as one frame.
    Batch {
        commands: Option<Vec<SimCommand>>,
    },
}

impl SimCommand {
    /// Every identifier in the catalogue.
    pub const IDS: [CommandId; 6] = [
        ASSIGN_MISSION,
        GROUP_UAVS,
        ENTITY_STATE,
        SIM_CLOCK,
        STATUS_TEXT,
        BATCH,
    ];

    /// Short variant name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            SimCommand::AssignMission { .. } => "AssignMission",
            SimCommand::GroupUavs { .. } => "GroupUavs",
            SimCommand::EntityState { .. } => "EntityState",
            SimCommand::SimClock { .. } => "SimClock",
            SimCommand::StatusText { .. } => "StatusText",
            SimCommand::Batch { .. } => "Batch",
        }
    }

    /// Decodes the payload of the variant identified by `id`.
    ///
    /// # Errors
    ///
    /// [`WireError::InvalidValue`] for an identifier outside the catalogue or
    /// for batches nested deeper than [`MAX_BATCH_DEPTH`], otherwise whatever
    /// the field readers report.
    pub fn decode(id: CommandId, p: &[u8]) -> Result<Self, WireError> {
        decode_at_depth(id, p, 0)
    }
}

impl Command for SimCommand {
    fn command_id(&self) -> CommandId {
        match self {
            SimCommand::AssignMission { .. } => ASSIGN_MISSION,
            SimCommand::GroupUavs { .. } => GROUP_UAVS,
            SimCommand::EntityState { .. } => ENTITY_STATE,
            SimCommand::SimClock { .. } => SIM_CLOCK,
            SimCommand::StatusText { .. } => STATUS_TEXT,
            SimCommand::Batch { .. } => BATCH,
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) {
        match self {
            SimCommand::AssignMission {
                uav_id,
                mission_id,
                waypoints,
            } => {
                write_string(buf, Some(uav_id));
                write_string(buf, Some(mission_id));
                write_list_infallible(buf, Some(waypoints.as_slice()), |b, v| write_vec3(b, *v));
            }
            SimCommand::GroupUavs { group_name, members } => {
                write_string(buf, group_name.as_deref());
                let start = buf.len();
                let written = write_string_list(buf, members.as_deref());
                recover_encode(buf, start, written, "GroupUavs.members");
            }
            SimCommand::EntityState {
                entity_id,
                position,
                heading_deg,
                alive,
            } => {
                write_i32(buf, *entity_id);
                write_vec3(buf, *position);
                write_f32(buf, *heading_deg);
                write_bool(buf, *alive);
            }
            SimCommand::SimClock { tick, sim_time_s } => {
                write_u64(buf, *tick);
                write_f64(buf, *sim_time_s);
            }
            SimCommand::StatusText { text } => write_string(buf, text.as_deref()),
            SimCommand::Batch { commands } => {
                write_list_infallible(buf, commands.as_deref(), write_nested);
            }
        }
    }
}

/// Installs a decoder for every catalogue identifier.
pub fn register_sim_commands(factory: &mut CommandFactory<SimCommand>) {
    factory.register_decoder(ASSIGN_MISSION, decode_assign_mission);
    factory.register_decoder(GROUP_UAVS, decode_group_uavs);
    factory.register_decoder(ENTITY_STATE, decode_entity_state);
    factory.register_decoder(SIM_CLOCK, decode_sim_clock);
    factory.register_decoder(STATUS_TEXT, decode_status_text);
    factory.register_decoder(BATCH, decode_batch);
}

/// A factory pre-populated with the whole catalogue.
pub fn sim_command_factory() -> CommandFactory<SimCommand> {
    let mut factory = CommandFactory::new();
    register_sim_commands(&mut factory);
    factory
}

// ── Encode helpers ────────────────────────────────────────────────────────────

/// Undoes a failed length-prefixed write at `start` and puts an empty block
/// in its place so the rest of the payload stays aligned.
///
/// A length only overflows its `i32` prefix past 2 GiB of elements or bytes.
/// Debug builds panic on it; release builds log the field at `warn`.
fn recover_encode(buf: &mut Vec<u8>, start: usize, written: Result<(), WireError>, field: &str) {
    debug_assert!(written.is_ok(), "failed to encode {field}: {written:?}");
    let Err(e) = written else {
        return;
    };
    warn!(field, error = %e, "field does not fit its length prefix; encoded as empty");
    buf.truncate(start);
    write_i32(buf, 0);
}

fn write_list_infallible<T, F>(buf: &mut Vec<u8>, items: Option<&[T]>, write_elem: F)
where
    F: FnMut(&mut Vec<u8>, &T),
{
    let start = buf.len();
    let written = write_list(buf, items, write_elem);
    recover_encode(buf, start, written, "list");
}

fn write_nested(buf: &mut Vec<u8>, cmd: &SimCommand) {
    write_u16(buf, cmd.command_id().0);
    let payload = cmd.to_payload();
    let start = buf.len();
    let written = write_bytes(buf, &payload);
    recover_encode(buf, start, written, cmd.name());
}

// ── Decode helpers ────────────────────────────────────────────────────────────

/// `depth` counts the batches enclosing the command being decoded.
fn decode_at_depth(id: CommandId, p: &[u8], depth: usize) -> Result<SimCommand, WireError> {
    match id {
        ASSIGN_MISSION => decode_assign_mission(p),
        GROUP_UAVS => decode_group_uavs(p),
        ENTITY_STATE => decode_entity_state(p),
        SIM_CLOCK => decode_sim_clock(p),
        STATUS_TEXT => decode_status_text(p),
        BATCH => decode_batch_at(p, depth),
        other => Err(WireError::InvalidValue(format!("unknown command id {other}"))),
    }
}

fn required_string(p: &[u8], off: usize, field: &str) -> Result<(String, usize), WireError> {
    match read_string(p, off)? {
        (Some(s), next) => Ok((s, next)),
        (None, _) => Err(WireError::InvalidValue(format!("{field} must not be null"))),
    }
}

fn decode_assign_mission(p: &[u8]) -> Result<SimCommand, WireError> {
    let (uav_id, off) = required_string(p, 0, "AssignMission.uav_id")?;
    let (mission_id, off) = required_string(p, off, "AssignMission.mission_id")?;
    let (waypoints, _) = read_list(p, off, read_vec3)?;
    Ok(SimCommand::AssignMission {
        uav_id,
        mission_id,
        waypoints: waypoints.unwrap_or_default(),
    })
}

fn decode_group_uavs(p: &[u8]) -> Result<SimCommand, WireError> {
    let (group_name, off) = read_string(p, 0)?;
    let (members, _) = read_string_list(p, off)?;
    Ok(SimCommand::GroupUavs { group_name, members })
}

fn decode_entity_state(p: &[u8]) -> Result<SimCommand, WireError> {
    let (entity_id, off) = read_i32(p, 0)?;
    let (position, off) = read_vec3(p, off)?;
    let (heading_deg, off) = read_f32(p, off)?;
    let (alive, _) = read_bool(p, off)?;
    Ok(SimCommand::EntityState {
        entity_id,
        position,
        heading_deg,
        alive,
    })
}

fn decode_sim_clock(p: &[u8]) -> Result<SimCommand, WireError> {
    let (tick, off) = read_u64(p, 0)?;
    let (sim_time_s, _) = read_f64(p, off)?;
    Ok(SimCommand::SimClock { tick, sim_time_s })
}

fn decode_status_text(p: &[u8]) -> Result<SimCommand, WireError> {
    let (text, _) = read_string(p, 0)?;
    Ok(SimCommand::StatusText { text })
}

fn decode_batch(p: &[u8]) -> Result<SimCommand, WireError> {
    decode_batch_at(p, 0)
}

fn decode_batch_at(p: &[u8], depth: usize) -> Result<SimCommand, WireError> {
    if depth > MAX_BATCH_DEPTH {
        return Err(WireError::InvalidValue("batch nesting too deep".into()));
    }
    let (commands, _) = read_list(p, 0, |b, off| read_nested(b, off, depth + 1))?;
    Ok(SimCommand::Batch { commands })
}

fn read_nested(p: &[u8], off: usize, depth: usize) -> Result<(SimCommand, usize), WireError> {
    let (id, off) = read_u16(p, off)?;
    let (payload, next) = read_bytes(p, off)?;
    Ok((decode_at_depth(CommandId(id), payload, depth)?, next))
}
