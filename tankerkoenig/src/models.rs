use serde::{Deserialize, Deserializer};

/// Fuel to search for in [crate::Tankerkoenig::nearby_stations]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "lowercase"))]
pub enum FuelType {
    All,
    Diesel,
    E5,
    E10,
}

impl FuelType {
    pub(crate) fn as_query(self) -> &'static str {
        match self {
            FuelType::All => "all",
            FuelType::Diesel => "diesel",
            FuelType::E5 => "e5",
            FuelType::E10 => "e10",
        }
    }
}

/// Order of the stations returned by [crate::Tankerkoenig::nearby_stations]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "lowercase"))]
pub enum SortOrder {
    Distance,
    Price,
    Time,
}

impl SortOrder {
    pub(crate) fn as_query(self) -> &'static str {
        match self {
            SortOrder::Distance => "dist",
            SortOrder::Price => "price",
            SortOrder::Time => "time",
        }
    }
}

/// Whether a station is currently selling fuel. The API reports `"no prices"` for stations that
/// have not published anything, this is mapped to [StationStatus::Unknown].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "lowercase"))]
pub enum StationStatus {
    Open,
    Closed,
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for StationStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let status = serde_json::Value::deserialize(deserializer)?;

        Ok(match status.as_str() {
            Some("open") => StationStatus::Open,
            Some("closed") => StationStatus::Closed,
            _ => StationStatus::Unknown,
        })
    }
}

/// Prices are either a number, or `false`/`null` when the fuel is not sold at the station.
fn price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Value(f64),
        Missing(bool),
    }

    match Option::<Price>::deserialize(deserializer)? {
        Some(Price::Value(v)) => Ok(Some(v)),
        Some(Price::Missing(false)) | None => Ok(None),
        Some(Price::Missing(true)) => Err(serde::de::Error::invalid_value(
            serde::de::Unexpected::Bool(true),
            &"a price, false or null",
        )),
    }
}

/// A single opening interval of a [Station], as described by the operator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct OpeningTime {
    /// Time of day, like `06:00:00`
    pub start: String,
    /// Time of day, like `22:30:00`
    pub end: String,
    /// Days this interval applies to, like `Mo-Fr`
    pub text: String,
}

/// A gas station. Only the location fields are always present, the other ones depend on the
/// endpoint that returned the station: `distance` is only set by nearby searches, while
/// `opening_times`, `state` and `overrides` only come with station details.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Station {
    pub id: String,
    pub name: String,
    pub street: String,
    #[serde(rename = "houseNumber")]
    pub house_number: String,
    #[serde(rename = "postCode")]
    pub post_code: u32,
    pub place: String,
    pub lat: f64,
    pub lng: f64,

    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "price")]
    pub diesel: Option<f64>,
    #[serde(default, deserialize_with = "price")]
    pub e5: Option<f64>,
    #[serde(default, deserialize_with = "price")]
    pub e10: Option<f64>,
    /// Price of the searched fuel, only set when searching for a single [FuelType]
    #[serde(default, deserialize_with = "price")]
    pub price: Option<f64>,
    #[serde(rename = "isOpen", default)]
    pub is_open: Option<bool>,
    #[serde(rename = "wholeDay", default)]
    pub whole_day: Option<bool>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(rename = "openingTimes", alias = "opening_times", default)]
    pub opening_times: Vec<OpeningTime>,
    /// Distance from the searched coordinates, in kilometers
    #[serde(rename = "dist", default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub overrides: Option<serde_json::Value>,
}

/// Current prices of a [Station], returned by [crate::Tankerkoenig::prices]
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PriceInfo {
    #[serde(default)]
    pub status: StationStatus,
    #[serde(default, deserialize_with = "price")]
    pub diesel: Option<f64>,
    #[serde(default, deserialize_with = "price")]
    pub e5: Option<f64>,
    #[serde(default, deserialize_with = "price")]
    pub e10: Option<f64>,
}
