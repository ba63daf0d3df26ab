use std::str::FromStr;

use chrono_tz::Tz;
use serde::Deserialize;

/// IANA zone name from the configuration, e.g. `time_zone = "America/Chicago"`.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ZoneName(pub Tz);

impl Default for ZoneName {
    fn default() -> Self {
        ZoneName(chrono_tz::America::Chicago)
    }
}

impl<'de> Deserialize<'de> for ZoneName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let value = String::deserialize(deserializer)?;
        let zone = ZoneName::from_str(&value).map_err(Error::custom)?;
        Ok(zone)
    }
}

impl FromStr for ZoneName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<Tz>() {
            Ok(zone) => Ok(Self(zone)),
            Err(e) => Err(format!("Unknown time zone {}: {}", s, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    pub struct Site {
        pub time_zone: ZoneName,
    }

    #[derive(Deserialize)]
    pub struct Config {
        pub site: Site,
    }

    #[test]
    fn test_zone_name() {
        let toml_str = r##"
[site]
time_zone = "Europe/Lisbon"
"##;
        let cfg: Config = toml::from_str::<Config>(toml_str).unwrap();
        assert_eq!(cfg.site.time_zone, ZoneName(chrono_tz::Europe::Lisbon));
    }

    #[test]
    fn test_unknown_zone() {
        let toml_str = r##"
[site]
time_zone = "Mars/Olympus_Mons"
"##;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }
}
