//! Typed placement actions.
//!
//! Callers identify placements with strings of the form `<kind>[:<tier>]`
//! (`"local:low"`, `"edge"`, `"cloud:high"`). The engine parses each
//! identifier once at the boundary into an [`Action`] and works only with
//! the typed value afterwards.
//!
//! Parsing never fails. Feasible-action lists come from trusted configuration
//! but can drift, so anything unrecognized degrades to the default placement
//! (`edge`, `med`) instead of being rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the work runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    /// On the requesting device.
    Local,
    /// On a nearby edge replica.
    #[default]
    Edge,
    /// In the cloud.
    Cloud,
}

impl PlacementKind {
    /// Fixed cost contribution of the placement kind, in milliseconds.
    pub fn cost_ms(self) -> f64 {
        match self {
            PlacementKind::Local => 0.0,
            PlacementKind::Edge => 15.0,
            PlacementKind::Cloud => 40.0,
        }
    }

    /// Increment added to the tier's base resource intensity.
    pub fn intensity_increment(self) -> f64 {
        match self {
            PlacementKind::Local => 0.0,
            PlacementKind::Edge => 1.0,
            PlacementKind::Cloud => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlacementKind::Local => "local",
            PlacementKind::Edge => "edge",
            PlacementKind::Cloud => "cloud",
        }
    }

    /// Recognizes `local` exactly and any `edge*`/`cloud*` prefix.
    fn from_prefix(s: &str) -> Self {
        if s.starts_with("cloud") {
            PlacementKind::Cloud
        } else if s.starts_with("edge") {
            PlacementKind::Edge
        } else if s == "local" {
            PlacementKind::Local
        } else {
            PlacementKind::Edge
        }
    }
}

/// How much capacity the placement reserves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Low,
    #[default]
    Med,
    High,
}

impl CostTier {
    /// Fixed cost contribution of the tier, in milliseconds.
    pub fn cost_ms(self) -> f64 {
        match self {
            CostTier::Low => 0.0,
            CostTier::Med => 40.0,
            CostTier::High => 120.0,
        }
    }

    /// Base resource intensity of the tier.
    pub fn base_intensity(self) -> f64 {
        match self {
            CostTier::Low => 1.0,
            CostTier::Med => 2.0,
            CostTier::High => 3.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CostTier::Low => "low",
            CostTier::Med => "med",
            CostTier::High => "high",
        }
    }

    fn from_str_lossy(s: &str) -> Self {
        match s {
            "low" => CostTier::Low,
            "high" => CostTier::High,
            _ => CostTier::Med,
        }
    }
}

/// A parsed placement action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub kind: PlacementKind,
    pub tier: CostTier,
}

impl Action {
    pub const fn new(kind: PlacementKind, tier: CostTier) -> Self {
        Self { kind, tier }
    }

    /// Parse an action identifier, normalizing anything malformed.
    ///
    /// ```
    /// use offload_decider::action::{Action, CostTier, PlacementKind};
    ///
    /// assert_eq!(Action::parse("cloud:high"), Action::new(PlacementKind::Cloud, CostTier::High));
    /// assert_eq!(Action::parse("edge-2"), Action::new(PlacementKind::Edge, CostTier::Med));
    /// assert_eq!(Action::parse("gpu:ultra"), Action::default());
    /// ```
    pub fn parse(id: &str) -> Self {
        if id.is_empty() {
            return Self::default();
        }
        let mut parts = id.split(':');
        let kind = PlacementKind::from_prefix(parts.next().unwrap_or(""));
        let tier = parts.next().map(CostTier::from_str_lossy).unwrap_or_default();
        Self { kind, tier }
    }

    /// Static placement cost in milliseconds (kind + tier).
    pub fn base_cost_ms(&self) -> f64 {
        self.kind.cost_ms() + self.tier.cost_ms()
    }

    /// Placement cost after applying the edge capacity factor.
    ///
    /// Only edge placements are scaled; a factor of exactly 1.0 is a no-op.
    pub fn cost_ms_with_capacity(&self, capacity_factor: f64) -> f64 {
        let base = self.base_cost_ms();
        if self.is_edge() {
            base * capacity_factor
        } else {
            base
        }
    }

    /// Resource-intensity score used for cross-tenant fairness.
    pub fn resource_intensity(&self) -> f64 {
        self.tier.base_intensity() + self.kind.intensity_increment()
    }

    #[inline]
    pub fn is_edge(&self) -> bool {
        self.kind == PlacementKind::Edge
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.tier.as_str())
    }
}

impl From<&str> for Action {
    fn from(id: &str) -> Self {
        Action::parse(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed() {
        assert_eq!(
            Action::parse("local:low"),
            Action::new(PlacementKind::Local, CostTier::Low)
        );
        assert_eq!(
            Action::parse("edge:high"),
            Action::new(PlacementKind::Edge, CostTier::High)
        );
        assert_eq!(
            Action::parse("cloud:med"),
            Action::new(PlacementKind::Cloud, CostTier::Med)
        );
    }

    #[test]
    fn test_parse_defaults() {
        // Missing tier
        assert_eq!(Action::parse("cloud").tier, CostTier::Med);
        // Empty string
        assert_eq!(Action::parse(""), Action::default());
        // Unknown kind and tier
        assert_eq!(
            Action::parse("mainframe:turbo"),
            Action::new(PlacementKind::Edge, CostTier::Med)
        );
        // Prefix matching for replicas
        assert_eq!(Action::parse("edge2:low").kind, PlacementKind::Edge);
        assert_eq!(Action::parse("cloud-eu:low").kind, PlacementKind::Cloud);
        // `local` must match exactly
        assert_eq!(Action::parse("localhost:low").kind, PlacementKind::Edge);
    }

    #[test]
    fn test_base_cost_table() {
        assert_eq!(Action::parse("local:low").base_cost_ms(), 0.0);
        assert_eq!(Action::parse("edge:med").base_cost_ms(), 55.0);
        assert_eq!(Action::parse("cloud:high").base_cost_ms(), 160.0);
    }

    #[test]
    fn test_resource_intensity_table() {
        assert_eq!(Action::parse("local:low").resource_intensity(), 1.0);
        assert_eq!(Action::parse("edge:med").resource_intensity(), 3.0);
        assert_eq!(Action::parse("cloud:high").resource_intensity(), 5.0);
    }

    #[test]
    fn test_capacity_scaling_only_for_edge() {
        let edge = Action::parse("edge:low");
        let cloud = Action::parse("cloud:low");
        assert_eq!(edge.cost_ms_with_capacity(0.5), 7.5);
        assert_eq!(cloud.cost_ms_with_capacity(0.5), 40.0);
        assert_eq!(edge.cost_ms_with_capacity(1.0), edge.base_cost_ms());
    }

    #[test]
    fn test_display_is_normalized() {
        assert_eq!(Action::parse("edge7").to_string(), "edge:med");
        assert_eq!(Action::parse("local:low").to_string(), "local:low");
    }
}
