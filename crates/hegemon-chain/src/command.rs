//! Typed player commands.
//!
//! On the wire a command is `{type, args, tick}`. Decoding dispatches on
//! `type`, parses `args` into the matching struct (unknown fields rejected)
//! and validates the values, so a malformed command never reaches a block.

use hegemon_core::Address;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// A command that failed to decode or validate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The `type` field names no known command.
    #[error("unknown command type `{0}`")]
    UnknownType(String),

    /// `args` does not match the schema of its type.
    #[error("malformed arguments for `{kind}`: {reason}")]
    MalformedArgs {
        /// Wire name of the command type
        kind: String,
        /// Decoder message
        reason: String,
    },

    /// Well-formed arguments with an out-of-range value.
    #[error("invalid `{kind}` command: {reason}")]
    Invalid {
        /// Wire name of the command type
        kind: &'static str,
        /// Which value was rejected
        reason: &'static str,
    },
}

/// Arguments of `genesis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenesisArgs {
    /// World seed chosen by the player
    pub seed: String,
    /// Settlement name
    pub name: String,
}

/// Arguments of `build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildArgs {
    /// Building type
    pub building: String,
    /// Grid slot inside the settlement
    pub slot: u32,
}

/// Arguments of `train`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrainArgs {
    /// Unit type
    pub unit: String,
    /// How many to train; at least one
    pub count: u32,
}

/// Arguments shared by `explore` and `claim_zone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ZoneArgs {
    /// Shared-world zone identifier
    pub zone_id: String,
}

/// Arguments of `attack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttackArgs {
    /// Defending player
    pub target: Address,
    /// Committed units by type, each count positive
    pub units: BTreeMap<String, u32>,
}

/// Arguments of `advance_era`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EraArgs {
    /// Era being entered
    pub era: u32,
}

/// Arguments of `post_trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TradeArgs {
    /// Id of the trade offer posted to the shared world
    pub offer_id: String,
}

/// One command type per variant, each with its own argument schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// First command of every chain; seeds the settlement.
    Genesis(GenesisArgs),
    /// Place a building.
    Build(BuildArgs),
    /// Recruit units.
    Train(TrainArgs),
    /// Reveal a zone.
    Explore(ZoneArgs),
    /// Take ownership of a zone.
    ClaimZone(ZoneArgs),
    /// Send units against another player.
    Attack(AttackArgs),
    /// Move to the next era.
    AdvanceEra(EraArgs),
    /// Publish a trade offer.
    PostTrade(TradeArgs),
}

impl CommandKind {
    /// Wire name carried in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Genesis(_) => "genesis",
            Self::Build(_) => "build",
            Self::Train(_) => "train",
            Self::Explore(_) => "explore",
            Self::ClaimZone(_) => "claim_zone",
            Self::Attack(_) => "attack",
            Self::AdvanceEra(_) => "advance_era",
            Self::PostTrade(_) => "post_trade",
        }
    }

    /// Whether this is the chain-opening command.
    pub fn is_genesis(&self) -> bool {
        matches!(self, Self::Genesis(_))
    }

    fn decode(kind: &str, args: Value) -> Result<Self, CommandError> {
        fn parse<T: serde::de::DeserializeOwned>(kind: &str, args: Value) -> Result<T, CommandError> {
            serde_json::from_value(args).map_err(|e| CommandError::MalformedArgs {
                kind: kind.to_string(),
                reason: e.to_string(),
            })
        }

        let decoded = match kind {
            "genesis" => Self::Genesis(parse(kind, args)?),
            "build" => Self::Build(parse(kind, args)?),
            "train" => Self::Train(parse(kind, args)?),
            "explore" => Self::Explore(parse(kind, args)?),
            "claim_zone" => Self::ClaimZone(parse(kind, args)?),
            "attack" => Self::Attack(parse(kind, args)?),
            "advance_era" => Self::AdvanceEra(parse(kind, args)?),
            "post_trade" => Self::PostTrade(parse(kind, args)?),
            other => return Err(CommandError::UnknownType(other.to_string())),
        };
        decoded.validate()?;
        Ok(decoded)
    }

    fn validate(&self) -> Result<(), CommandError> {
        let invalid = |reason| {
            Err(CommandError::Invalid {
                kind: self.name(),
                reason,
            })
        };
        match self {
            Self::Genesis(args) if args.seed.is_empty() => invalid("seed is empty"),
            Self::Genesis(args) if args.name.trim().is_empty() => invalid("name is empty"),
            Self::Build(args) if args.building.is_empty() => invalid("building is empty"),
            Self::Train(args) if args.unit.is_empty() => invalid("unit is empty"),
            Self::Train(args) if args.count == 0 => invalid("count must be positive"),
            Self::Explore(args) | Self::ClaimZone(args) if args.zone_id.is_empty() => {
                invalid("zoneId is empty")
            }
            Self::Attack(args) if !args.target.is_well_formed() => invalid("target is not an address"),
            Self::Attack(args) if args.units.is_empty() => invalid("no units committed"),
            Self::Attack(args) if args.units.values().any(|&n| n == 0) => {
                invalid("unit counts must be positive")
            }
            Self::AdvanceEra(args) if args.era == 0 => invalid("era must be positive"),
            Self::PostTrade(args) if args.offer_id.is_empty() => invalid("offerId is empty"),
            _ => Ok(()),
        }
    }
}

/// A validated command stamped with the simulation tick it was issued at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCommand")]
pub struct ActionCommand {
    kind: CommandKind,
    tick: u64,
}

impl ActionCommand {
    /// Validate `kind` and stamp it with `tick`.
    pub fn new(kind: CommandKind, tick: u64) -> Result<Self, CommandError> {
        kind.validate()?;
        Ok(Self { kind, tick })
    }

    /// Genesis command at tick 0.
    pub fn genesis(seed: impl Into<String>, name: impl Into<String>) -> Result<Self, CommandError> {
        Self::new(
            CommandKind::Genesis(GenesisArgs {
                seed: seed.into(),
                name: name.into(),
            }),
            0,
        )
    }

    /// Command type and arguments.
    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Tick the command was issued at.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommand {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    args: Value,
    tick: u64,
}

impl TryFrom<RawCommand> for ActionCommand {
    type Error = CommandError;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: CommandKind::decode(&raw.kind, raw.args)?,
            tick: raw.tick,
        })
    }
}

impl Serialize for ActionCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ActionCommand", 3)?;
        state.serialize_field("type", self.kind.name())?;
        match &self.kind {
            CommandKind::Genesis(args) => state.serialize_field("args", args)?,
            CommandKind::Build(args) => state.serialize_field("args", args)?,
            CommandKind::Train(args) => state.serialize_field("args", args)?,
            CommandKind::Explore(args) | CommandKind::ClaimZone(args) => {
                state.serialize_field("args", args)?;
            }
            CommandKind::Attack(args) => state.serialize_field("args", args)?,
            CommandKind::AdvanceEra(args) => state.serialize_field("args", args)?,
            CommandKind::PostTrade(args) => state.serialize_field("args", args)?,
        }
        state.serialize_field("tick", &self.tick)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_type_args_tick() {
        let cmd = ActionCommand::new(
            CommandKind::Explore(ZoneArgs {
                zone_id: "z-4-7".to_string(),
            }),
            12,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"type": "explore", "args": {"zoneId": "z-4-7"}, "tick": 12})
        );
        let back: ActionCommand = serde_json::from_value(json!({
            "type": "explore", "args": {"zoneId": "z-4-7"}, "tick": 12
        }))
        .unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = serde_json::from_value::<ActionCommand>(json!({
            "type": "teleport", "args": {}, "tick": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown command type"));
    }

    #[test]
    fn unknown_argument_fields_are_rejected() {
        let err = serde_json::from_value::<ActionCommand>(json!({
            "type": "build", "args": {"building": "farm", "slot": 1, "free": true}, "tick": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("malformed arguments"));
    }

    #[test]
    fn wrongly_typed_arguments_are_rejected() {
        assert!(serde_json::from_value::<ActionCommand>(json!({
            "type": "train", "args": {"unit": "archer", "count": "many"}, "tick": 1
        }))
        .is_err());
    }

    #[test]
    fn semantic_validation_runs_at_decode() {
        assert!(serde_json::from_value::<ActionCommand>(json!({
            "type": "train", "args": {"unit": "archer", "count": 0}, "tick": 1
        }))
        .is_err());
        assert!(ActionCommand::new(
            CommandKind::Attack(AttackArgs {
                target: Address::new_unchecked("nobody"),
                units: BTreeMap::from([("spear".to_string(), 3)]),
            }),
            1
        )
        .is_err());
    }
}
