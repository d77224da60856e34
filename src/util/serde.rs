//! Serde helpers shared by wire types.

/// (De)serialize `Option<Duration>` as fractional seconds (`12.5`) or `null`.
pub mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from seconds; negative values clamp to zero, values that
    /// fit no `Duration` read as `None`.
    ///
    /// # Errors
    ///
    /// Fails when the value is neither a number nor `null`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.and_then(|s| Duration::try_from_secs_f64(s.max(0.0)).ok()))
    }
}
