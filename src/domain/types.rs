//! Shared value types: coordinates, vehicles, driving conditions and POIs

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

/// Errors raised when constructing domain values from raw input
#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("invalid vehicle: {0}")]
    InvalidVehicle(String),

    #[error("tour cannot move from {from} to {to}")]
    InvalidTourTransition { from: &'static str, to: &'static str },
}

/// A point on the Earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = DomainError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, DomainError> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        if !valid {
            return Err(DomainError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.lat
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.lon
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lon)
    }
}

/// Newtype wrapper for POI identifiers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoiId(pub String);

impl std::fmt::Display for PoiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoiId {
    fn from(s: &str) -> Self {
        PoiId(s.to_string())
    }
}

/// Charging connector standards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingPort {
    Ccs1,
    Ccs2,
    Nacs,
    Chademo,
    J1772,
    Type2,
}

impl ChargingPort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargingPort::Ccs1 => "ccs1",
            ChargingPort::Ccs2 => "ccs2",
            ChargingPort::Nacs => "nacs",
            ChargingPort::Chademo => "chademo",
            ChargingPort::J1772 => "j1772",
            ChargingPort::Type2 => "type2",
        }
    }
}

pub type PortSet = SmallVec<[ChargingPort; 4]>;

/// An electric vehicle. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VehicleSpec")]
pub struct Vehicle {
    id: String,
    name: String,
    battery_capacity_kwh: f64,
    epa_range_miles: f64,
    consumption_kwh_per_mile: f64,
    ports: PortSet,
}

/// Unvalidated vehicle description as it appears in request files
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub battery_capacity_kwh: f64,
    pub epa_range_miles: f64,
    pub consumption_kwh_per_mile: f64,
    pub ports: Vec<ChargingPort>,
}

impl TryFrom<VehicleSpec> for Vehicle {
    type Error = DomainError;

    fn try_from(spec: VehicleSpec) -> Result<Self, Self::Error> {
        let name = spec.name.unwrap_or_else(|| spec.id.clone());
        Vehicle::new(
            spec.id,
            name,
            spec.battery_capacity_kwh,
            spec.epa_range_miles,
            spec.consumption_kwh_per_mile,
            spec.ports,
        )
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl Vehicle {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        battery_capacity_kwh: f64,
        epa_range_miles: f64,
        consumption_kwh_per_mile: f64,
        ports: impl IntoIterator<Item = ChargingPort>,
    ) -> Result<Self, DomainError> {
        if !positive(battery_capacity_kwh) {
            return Err(DomainError::InvalidVehicle(format!(
                "battery capacity must be positive, got {battery_capacity_kwh}"
            )));
        }
        if !positive(epa_range_miles) {
            return Err(DomainError::InvalidVehicle(format!(
                "EPA range must be positive, got {epa_range_miles}"
            )));
        }
        if !positive(consumption_kwh_per_mile) {
            return Err(DomainError::InvalidVehicle(format!(
                "consumption must be positive, got {consumption_kwh_per_mile}"
            )));
        }

        let mut port_set = PortSet::new();
        for port in ports {
            if !port_set.contains(&port) {
                port_set.push(port);
            }
        }
        if port_set.is_empty() {
            return Err(DomainError::InvalidVehicle("at least one charging port required".into()));
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            battery_capacity_kwh,
            epa_range_miles,
            consumption_kwh_per_mile,
            ports: port_set,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn battery_capacity_kwh(&self) -> f64 {
        self.battery_capacity_kwh
    }

    pub fn epa_range_miles(&self) -> f64 {
        self.epa_range_miles
    }

    pub fn consumption_kwh_per_mile(&self) -> f64 {
        self.consumption_kwh_per_mile
    }

    pub fn ports(&self) -> &[ChargingPort] {
        &self.ports
    }

    pub fn supports(&self, port: ChargingPort) -> bool {
        self.ports.contains(&port)
    }
}

/// Environmental inputs to a range calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrivingConditions {
    /// Ambient temperature in °F
    pub temperature_f: f64,
    /// Hours parked in the cold before departure
    #[serde(default)]
    pub cold_soak_hours: Option<f64>,
    /// Net elevation change over the trip in feet (negative = descent)
    #[serde(default)]
    pub elevation_change_ft: f64,
    #[serde(default = "default_average_speed")]
    pub average_speed_mph: f64,
}

fn default_average_speed() -> f64 {
    55.0
}

impl Default for DrivingConditions {
    fn default() -> Self {
        Self::standard()
    }
}

impl DrivingConditions {
    /// Reference conditions: 70°F, no soak, flat, 55 mph
    pub fn standard() -> Self {
        Self {
            temperature_f: 70.0,
            cold_soak_hours: None,
            elevation_change_ft: 0.0,
            average_speed_mph: default_average_speed(),
        }
    }

    pub fn with_temperature(mut self, temperature_f: f64) -> Self {
        self.temperature_f = temperature_f;
        self
    }

    pub fn with_cold_soak(mut self, hours: f64) -> Self {
        self.cold_soak_hours = Some(hours);
        self
    }

    pub fn with_elevation_change(mut self, feet: f64) -> Self {
        self.elevation_change_ft = feet;
        self
    }

    pub fn with_average_speed(mut self, mph: f64) -> Self {
        self.average_speed_mph = mph;
        self
    }

    /// Same conditions once the vehicle is moving; soak loss only hits the first departure
    pub fn departed(mut self) -> Self {
        self.cold_soak_hours = None;
        self
    }

    /// Soak hours, treating a missing value as zero
    #[inline]
    pub fn soak_hours(&self) -> f64 {
        self.cold_soak_hours.unwrap_or(0.0)
    }
}

/// POI classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Landmark,
    Museum,
    Park,
    Viewpoint,
    Historic,
    Beach,
    Restaurant,
    EvCharger,
    Other,
}

impl PoiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiCategory::Landmark => "landmark",
            PoiCategory::Museum => "museum",
            PoiCategory::Park => "park",
            PoiCategory::Viewpoint => "viewpoint",
            PoiCategory::Historic => "historic",
            PoiCategory::Beach => "beach",
            PoiCategory::Restaurant => "restaurant",
            PoiCategory::EvCharger => "ev_charger",
            PoiCategory::Other => "other",
        }
    }

    /// Human phrasing used when narrating
    pub fn describe(&self) -> &'static str {
        match self {
            PoiCategory::Landmark => "a landmark",
            PoiCategory::Museum => "a museum",
            PoiCategory::Park => "a park",
            PoiCategory::Viewpoint => "a scenic viewpoint",
            PoiCategory::Historic => "a historic site",
            PoiCategory::Beach => "a beach",
            PoiCategory::Restaurant => "a place to eat",
            PoiCategory::EvCharger => "a charging station",
            PoiCategory::Other => "a point of interest",
        }
    }
}

/// Charger details for charging-capable POIs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargerInfo {
    /// Connector standards offered; empty means unknown and treated as universal
    #[serde(default)]
    pub ports: PortSet,
    #[serde(default)]
    pub power_kw: Option<f64>,
}

/// A point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: PoiId,
    pub name: String,
    pub category: PoiCategory,
    pub location: Coordinate,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub charger: Option<ChargerInfo>,
}

impl Poi {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: PoiCategory,
        location: Coordinate,
    ) -> Self {
        Self {
            id: PoiId(id.into()),
            name: name.into(),
            category,
            location,
            rating: None,
            hours: None,
            tags: Vec::new(),
            description: None,
            charger: None,
        }
    }

    /// Build a charging station POI
    pub fn charger(
        id: impl Into<String>,
        name: impl Into<String>,
        location: Coordinate,
        ports: impl IntoIterator<Item = ChargingPort>,
        power_kw: Option<f64>,
    ) -> Self {
        let mut poi = Self::new(id, name, PoiCategory::EvCharger, location);
        poi.charger = Some(ChargerInfo { ports: ports.into_iter().collect(), power_kw });
        poi
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    #[inline]
    pub fn is_charger(&self) -> bool {
        self.category == PoiCategory::EvCharger
    }

    /// Whether the vehicle can plug in here
    pub fn is_compatible_with(&self, vehicle: &Vehicle) -> bool {
        if !self.is_charger() {
            return false;
        }
        match &self.charger {
            Some(info) if !info.ports.is_empty() => info.ports.iter().any(|p| vehicle.supports(*p)),
            _ => true,
        }
    }

    pub fn charger_power_kw(&self) -> Option<f64> {
        self.charger.as_ref().and_then(|c| c.power_kw).filter(|kw| positive(*kw))
    }
}
