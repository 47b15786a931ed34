//! # Parameter Registry
//!
//! Owns the live [`Params`] and a dirty flag. Mutation goes through
//! [`ParamRegistry::set_param`], which type-checks the new value against the
//! parameter's declared [`ParamKind`]. The lifecycle driver re-serializes the
//! blob into native state at Commit whenever the registry is dirty.

use serde_json::Value;
use shared_types::{format_ratio, parse_ratio, Address};
use num_traits::Signed;
use tracing::info;

use crate::errors::{ParamError, ParamResult};
use crate::params::{param_kind, CubePubKey, ParamKind, Params};

/// Native-state key of the serialized parameter blob.
pub const PARAMS_KEY: &[u8] = b"params";

/// Process-wide parameter registry with dirty tracking.
#[derive(Debug, Clone, Default)]
pub struct ParamRegistry {
    params: Params,
    dirty: bool,
}

impl ParamRegistry {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            dirty: false,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Replaces every parameter at once (genesis, reload).
    pub fn replace(&mut self, params: Params) {
        self.params = params;
        self.dirty = true;
    }

    /// Sets one parameter from its string form and marks the registry dirty.
    pub fn set_param(&mut self, name: &str, value: &str) -> ParamResult<()> {
        let typed = check_param_type(name, value)?;
        let mut object = serde_json::to_value(&self.params)?;
        if let Value::Object(fields) = &mut object {
            fields.insert(name.to_string(), typed);
        }
        self.params = serde_json::from_value(object)?;
        self.dirty = true;
        info!(param = name, value = value, "Parameter changed");
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag, returning its previous value.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Serialized blob as stored under [`PARAMS_KEY`].
    pub fn to_blob(&self) -> ParamResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.params)?)
    }

    /// Loads a registry from a stored blob; the result is clean.
    pub fn from_blob(blob: &[u8]) -> ParamResult<Self> {
        Ok(Self::new(serde_json::from_slice(blob)?))
    }
}

/// Validates `value` against the declared kind of `name`, returning the
/// JSON form stored in the blob.
pub fn check_param_type(name: &str, value: &str) -> ParamResult<Value> {
    let kind = param_kind(name).ok_or_else(|| ParamError::UnknownParam(name.to_string()))?;
    let invalid = |reason: &str| ParamError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = value.trim();

    let typed = match kind {
        ParamKind::U16 => Value::from(trimmed.parse::<u16>().map_err(|_| invalid("expected uint16"))?),
        ParamKind::I16 => Value::from(trimmed.parse::<i16>().map_err(|_| invalid("expected int16"))?),
        ParamKind::Uint => Value::from(trimmed.parse::<u64>().map_err(|_| invalid("expected uint"))?),
        ParamKind::Int => Value::from(trimmed.parse::<i64>().map_err(|_| invalid("expected int"))?),
        ParamKind::Rat => {
            let ratio = parse_ratio(trimmed).map_err(|_| invalid("expected rational"))?;
            if ratio.is_negative() {
                return Err(invalid("ratio must not be negative"));
            }
            Value::String(format_ratio(&ratio))
        }
        ParamKind::Bool => match trimmed {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(invalid("expected bool")),
        },
        ParamKind::Json => {
            serde_json::from_str::<Vec<CubePubKey>>(trimmed)
                .map_err(|_| invalid("expected JSON list of cube keys"))?;
            Value::String(trimmed.to_string())
        }
        ParamKind::Address => {
            let address: Address = trimmed.parse().map_err(|_| invalid("expected address"))?;
            Value::String(address.to_string())
        }
    };
    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::ratio_from_ints;

    #[test]
    fn test_set_param_marks_dirty() {
        let mut registry = ParamRegistry::default();
        assert!(!registry.is_dirty());

        registry.set_param("unstake_waiting_period", "100").unwrap();
        assert_eq!(registry.params().unstake_waiting_period, 100);
        assert!(registry.take_dirty());
        assert!(!registry.is_dirty());
    }

    #[test]
    fn test_set_ratio_accepts_decimal() {
        let mut registry = ParamRegistry::default();
        registry.set_param("slash_ratio", "0.002").unwrap();
        assert_eq!(registry.params().slash_ratio, ratio_from_ints(1, 500));
    }

    #[test]
    fn test_rejects_unknown_and_mistyped() {
        let mut registry = ParamRegistry::default();
        assert!(matches!(
            registry.set_param("no_such_param", "1"),
            Err(ParamError::UnknownParam(_))
        ));
        assert!(registry.set_param("max_vals", "70000").is_err());
        assert!(registry.set_param("slash_enabled", "yes").is_err());
        assert!(registry.set_param("slash_ratio", "-1/2").is_err());
        assert!(registry.set_param("cube_pub_keys", "{not json").is_err());
        assert!(!registry.is_dirty());
    }

    #[test]
    fn test_set_bool_and_address() {
        let mut registry = ParamRegistry::default();
        registry.set_param("slash_enabled", "false").unwrap();
        assert!(!registry.params().slash_enabled);

        registry
            .set_param("foundation_address", "0x00000000000000000000000000000000000000aa")
            .unwrap();
        assert_eq!(registry.params().foundation_address.0[19], 0xaa);
    }

    #[test]
    fn test_blob_round_trip() {
        let mut registry = ParamRegistry::default();
        registry.set_param("max_vals", "7").unwrap();
        let blob = registry.to_blob().unwrap();
        let loaded = ParamRegistry::from_blob(&blob).unwrap();
        assert_eq!(loaded.params(), registry.params());
        assert!(!loaded.is_dirty());
    }

    proptest! {
        #[test]
        fn test_blob_identity_for_valid_values(
            max_vals in 1u16..500,
            period in 1u64..1_000_000,
            num in 0i64..1000,
            den in 1i64..1000,
        ) {
            let mut registry = ParamRegistry::default();
            registry.set_param("max_vals", &max_vals.to_string()).unwrap();
            registry.set_param("unstake_waiting_period", &period.to_string()).unwrap();
            registry.set_param("slash_ratio", &format!("{num}/{den}")).unwrap();
            let blob = registry.to_blob().unwrap();
            let reloaded = ParamRegistry::from_blob(&blob).unwrap();
            prop_assert_eq!(reloaded.to_blob().unwrap(), blob);
        }
    }
}
