pub mod gateway;
pub mod payload;
pub mod rest;
pub mod stats;
pub mod track;
pub mod voice;

/// Snowflake ids travel as strings on the wire but are also accepted as numbers.
pub(crate) mod id {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Num(u64)
    }

    impl RawId {
        fn parse<E: Error>(self) -> Result<u64, E> {
            match self {
                Self::Str(s) => s.parse().map_err(|_| E::custom(format!("invalid snowflake `{s}`"))),
                Self::Num(n) => Ok(n)
            }
        }
    }

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        RawId::deserialize(deserializer)?.parse()
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(id: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
            match id {
                Some(id) => serializer.collect_str(id),
                None => serializer.serialize_none()
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
            Option::<RawId>::deserialize(deserializer)?
                .map(RawId::parse)
                .transpose()
        }
    }
}
