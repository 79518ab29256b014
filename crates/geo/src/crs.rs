//! Coordinate reference system identifiers

/// An EPSG code identifying a coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Epsg(u32);

impl Epsg {
    pub const fn new(code: u32) -> Self {
        Epsg(code)
    }

    pub const fn code(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Epsg {
    fn from(code: u32) -> Self {
        Epsg(code)
    }
}

impl From<Epsg> for u32 {
    fn from(epsg: Epsg) -> Self {
        epsg.0
    }
}

impl std::fmt::Display for Epsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl std::str::FromStr for Epsg {
    type Err = crate::Error;

    /// Accepts both `31370` and `EPSG:31370`
    fn from_str(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        let code = match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("epsg:") => &trimmed[5..],
            _ => trimmed,
        };

        Ok(Epsg(code.parse::<u32>()?))
    }
}

pub mod epsg {
    use super::Epsg;

    pub const WGS84: Epsg = Epsg::new(4326);
    pub const WGS84_WEB_MERCATOR: Epsg = Epsg::new(3857);
    pub const BELGIAN_LAMBERT72: Epsg = Epsg::new(31370);
    pub const ETRS89_LAEA: Epsg = Epsg::new(3035);
}
