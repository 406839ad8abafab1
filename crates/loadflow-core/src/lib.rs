//! # loadflow-core: Power Network Modeling Core
//!
//! Data structures for steady-state load-flow analysis: buses, branches, and
//! the [`Network`] container with its frozen load-time snapshot.
//!
//! ## Design
//!
//! - **Typed IDs**: [`BusId`] and [`BranchKey`] are newtype identifiers, so a
//!   bus number can never be confused with a matrix index or a circuit number.
//! - **Closed bus classification**: [`BusKind`] is resolved once from the raw
//!   source type code at [`Bus`] construction and never re-derived.
//! - **Snapshot/restore**: [`Network::load`] freezes one immutable snapshot of
//!   the bus and branch tables. [`Network::restore`] replaces the live tables
//!   with the snapshot verbatim, discarding edits and result fields. The
//!   snapshot itself is never mutated after creation.
//! - **Deterministic ordering**: buses and branches live in `BTreeMap`s, so
//!   every iteration over the model is in ascending key order. Downstream
//!   matrix index assignment inherits this determinism.
//!
//! ## Quick Start
//!
//! ```
//! use loadflow_core::{Branch, Bus, Network};
//!
//! let buses = vec![
//!     Bus::new(1, "SLACK", "2"),
//!     Bus::new(2, "LOAD", "0").with_load(50.0, 10.0),
//! ];
//! let branches = vec![Branch::line(1, 2, 1, 0.01, 0.1)];
//!
//! let mut network = Network::load("two bus", buses, branches).unwrap();
//! assert_eq!(network.stats().num_buses, 2);
//!
//! // Edits are reverted by restore()
//! network.bus_mut(loadflow_core::BusId::new(2)).unwrap().active = false;
//! network.restore();
//! assert!(network.bus(loadflow_core::BusId::new(2)).unwrap().active);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod diagnostics;
pub mod error;
pub mod topology;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{ModelError, ModelResult};
pub use units::{Degrees, Megavars, Megawatts, PerUnit, Radians};

/// Marker digit in the raw bus type code identifying the reference (slack) bus.
const SLACK_TYPE_MARKER: char = '2';
/// Marker digit in the raw bus type code identifying a voltage-controlled generator bus.
const GENERATOR_TYPE_MARKER: char = '1';

/// Bus number, unique across the network. Positive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BusId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Branch identity: endpoints plus a circuit number disambiguating parallel
/// branches between the same pair of buses.
///
/// Rendered and serialized as `from-to-circuit` (e.g. `1-2-1`), which keeps
/// branch tables keyed by readable strings in the persistence contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchKey {
    pub from: BusId,
    pub to: BusId,
    pub circuit: u32,
}

impl std::fmt::Display for BranchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.from, self.to, self.circuit)
    }
}

impl std::str::FromStr for BranchKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || format!("malformed branch key '{}'", s);
        let mut parts = s.split('-');
        let from: usize = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let to: usize = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let circuit: u32 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(BranchKey {
            from: BusId(from),
            to: BusId(to),
            circuit,
        })
    }
}

impl Serialize for BranchKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BranchKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Bus classification for load flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusKind {
    /// Reference (slack) bus: V and θ are fixed, P and Q are calculated
    Ref,
    /// PV bus: P and V are specified, Q and θ are calculated
    Pv,
    /// PQ bus: P and Q are specified, V and θ are calculated
    Pq,
}

impl BusKind {
    /// Resolve the classification from the raw source type code.
    ///
    /// The code is a short digit string from the network description; a code
    /// containing the slack marker is the reference bus, one containing the
    /// generator marker is a PV bus, anything else is PQ.
    pub fn from_type_code(code: &str) -> Self {
        if code.contains(SLACK_TYPE_MARKER) {
            BusKind::Ref
        } else if code.contains(GENERATOR_TYPE_MARKER) {
            BusKind::Pv
        } else {
            BusKind::Pq
        }
    }
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BusKind::Ref => "REF",
            BusKind::Pv => "PV",
            BusKind::Pq => "PQ",
        };
        write!(f, "{}", name)
    }
}

/// A network bus: identity, classification, specified quantities, limits,
/// and (after a solve) result fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    /// Unique bus number
    pub number: BusId,
    /// Bus label from the network description
    pub name: String,
    /// Classification, resolved once from the raw type code
    pub kind: BusKind,
    /// Voltage magnitude: setpoint for Ref/Pv, initial guess for Pq
    pub voltage: PerUnit,
    /// Voltage angle: specified for Ref, initial guess elsewhere
    pub angle: Radians,
    /// Active power generation (MW)
    pub p_gen: Megawatts,
    /// Reactive power generation (Mvar)
    pub q_gen: Megavars,
    /// Active power load (MW)
    pub p_load: Megawatts,
    /// Reactive power load (Mvar)
    pub q_load: Megavars,
    /// Minimum reactive generation, enforced for Pv buses only; `None` = unlimited
    pub q_min: Option<Megavars>,
    /// Maximum reactive generation, enforced for Pv buses only; `None` = unlimited
    pub q_max: Option<Megavars>,
    /// Shunt susceptance connected at the bus (pu, added to the Ybus diagonal)
    pub shunt_b: PerUnit,
    /// Area number
    pub area: u32,
    /// In-service flag; inactive buses are excluded from the solved system
    pub active: bool,
    /// Solved voltage magnitude, populated only by a terminal solver state
    pub v_result: Option<PerUnit>,
    /// Solved voltage angle, populated only by a terminal solver state
    pub angle_result: Option<Radians>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            number: BusId(0),
            name: String::new(),
            kind: BusKind::Pq,
            voltage: PerUnit(1.0),
            angle: Radians(0.0),
            p_gen: Megawatts(0.0),
            q_gen: Megavars(0.0),
            p_load: Megawatts(0.0),
            q_load: Megavars(0.0),
            q_min: None,
            q_max: None,
            shunt_b: PerUnit(0.0),
            area: 0,
            active: true,
            v_result: None,
            angle_result: None,
        }
    }
}

impl Bus {
    /// Create a bus from its number, label, and raw type code.
    pub fn new(number: usize, name: impl Into<String>, type_code: &str) -> Self {
        Self {
            number: BusId(number),
            name: name.into(),
            kind: BusKind::from_type_code(type_code),
            ..Self::default()
        }
    }

    /// Set the voltage magnitude (setpoint or initial guess) and angle.
    pub fn with_voltage(mut self, v_pu: f64, angle_rad: f64) -> Self {
        self.voltage = PerUnit(v_pu);
        self.angle = Radians(angle_rad);
        self
    }

    /// Set generation (MW, Mvar).
    pub fn with_generation(mut self, p_mw: f64, q_mvar: f64) -> Self {
        self.p_gen = Megawatts(p_mw);
        self.q_gen = Megavars(q_mvar);
        self
    }

    /// Set load (MW, Mvar).
    pub fn with_load(mut self, p_mw: f64, q_mvar: f64) -> Self {
        self.p_load = Megawatts(p_mw);
        self.q_load = Megavars(q_mvar);
        self
    }

    /// Set reactive generation limits (Mvar).
    pub fn with_q_limits(mut self, q_min: f64, q_max: f64) -> Self {
        self.q_min = Some(Megavars(q_min));
        self.q_max = Some(Megavars(q_max));
        self
    }

    /// Set the bus shunt susceptance (pu).
    pub fn with_shunt(mut self, b_pu: f64) -> Self {
        self.shunt_b = PerUnit(b_pu);
        self
    }

    /// Net specified active injection: generation minus load.
    pub fn net_p(&self) -> Megawatts {
        self.p_gen - self.p_load
    }

    /// Net specified reactive injection: generation minus load.
    pub fn net_q(&self) -> Megavars {
        self.q_gen - self.q_load
    }
}

/// Branch element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    Line,
    Transformer,
}

/// A series branch: transmission line or transformer in the π-model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub from: BusId,
    pub to: BusId,
    /// Circuit number disambiguating parallel branches
    pub circuit: u32,
    pub kind: BranchKind,
    /// Series resistance (pu)
    pub r: f64,
    /// Series reactance (pu)
    pub x: f64,
    /// Total line charging susceptance (pu, split half/half across terminals)
    pub shunt_b: f64,
    /// Off-nominal tap ratio, applied at the from side; meaningful for transformers
    pub tap_ratio: f64,
    /// In-service flag
    pub active: bool,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            from: BusId(0),
            to: BusId(0),
            circuit: 1,
            kind: BranchKind::Line,
            r: 0.0,
            x: 0.0,
            shunt_b: 0.0,
            tap_ratio: 1.0,
            active: true,
        }
    }
}

impl Branch {
    /// Create a transmission line.
    pub fn line(from: usize, to: usize, circuit: u32, r: f64, x: f64) -> Self {
        Self {
            from: BusId(from),
            to: BusId(to),
            circuit,
            kind: BranchKind::Line,
            r,
            x,
            ..Self::default()
        }
    }

    /// Create a transformer with an off-nominal tap ratio at the from side.
    pub fn transformer(from: usize, to: usize, circuit: u32, r: f64, x: f64, tap: f64) -> Self {
        Self {
            from: BusId(from),
            to: BusId(to),
            circuit,
            kind: BranchKind::Transformer,
            r,
            x,
            tap_ratio: tap,
            ..Self::default()
        }
    }

    /// Set the total line charging susceptance (pu).
    pub fn with_charging(mut self, b_pu: f64) -> Self {
        self.shunt_b = b_pu;
        self
    }

    /// The branch identity.
    pub fn key(&self) -> BranchKey {
        BranchKey {
            from: self.from,
            to: self.to,
            circuit: self.circuit,
        }
    }
}

/// Frozen copy of the bus and branch tables, taken once at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    buses: BTreeMap<BusId, Bus>,
    branches: BTreeMap<BranchKey, Branch>,
}

/// The network container: bus and branch tables plus the load-time snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Case title from the network description
    pub title: String,
    /// Buses keyed by number, iterated in ascending order
    pub buses: BTreeMap<BusId, Bus>,
    /// Branches keyed by identity
    pub branches: BTreeMap<BranchKey, Branch>,
    snapshot: Snapshot,
}

impl Network {
    /// Build a network from bus and branch records and freeze the snapshot.
    ///
    /// Validates the network-level invariants of the ingestion contract:
    /// positive unique bus numbers, unique branch identities, and resolvable
    /// endpoints. Reference-bus and connectivity invariants depend on the
    /// `active` flags and are checked at solve time instead, so that a loaded
    /// network can be edited before being solved.
    pub fn load(
        title: impl Into<String>,
        buses: Vec<Bus>,
        branches: Vec<Branch>,
    ) -> ModelResult<Self> {
        let mut bus_table: BTreeMap<BusId, Bus> = BTreeMap::new();
        for bus in buses {
            let number = bus.number;
            if number.value() == 0 {
                return Err(ModelError::InvalidBusNumber);
            }
            if bus_table.insert(number, bus).is_some() {
                return Err(ModelError::DuplicateBus(number));
            }
        }

        let mut branch_table: BTreeMap<BranchKey, Branch> = BTreeMap::new();
        for branch in branches {
            let key = branch.key();
            for endpoint in [key.from, key.to] {
                if !bus_table.contains_key(&endpoint) {
                    return Err(ModelError::UnknownEndpoint {
                        branch: key,
                        bus: endpoint,
                    });
                }
            }
            if branch_table.insert(key, branch).is_some() {
                return Err(ModelError::DuplicateBranch(key));
            }
        }

        let snapshot = Snapshot {
            buses: bus_table.clone(),
            branches: branch_table.clone(),
        };

        Ok(Self {
            title: title.into(),
            buses: bus_table,
            branches: branch_table,
            snapshot,
        })
    }

    /// Revert buses and branches to the load-time snapshot, discarding all
    /// edits and result fields. Idempotent.
    pub fn restore(&mut self) {
        self.buses = self.snapshot.buses.clone();
        self.branches = self.snapshot.branches.clone();
    }

    /// Look up a bus by number.
    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.get(&id)
    }

    /// Look up a bus by number, mutably.
    pub fn bus_mut(&mut self, id: BusId) -> Option<&mut Bus> {
        self.buses.get_mut(&id)
    }

    /// Look up a branch by identity, mutably.
    pub fn branch_mut(&mut self, key: BranchKey) -> Option<&mut Branch> {
        self.branches.get_mut(&key)
    }

    /// Active buses in ascending number order.
    pub fn active_buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.values().filter(|b| b.active)
    }

    /// Active branches in ascending identity order.
    pub fn active_branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values().filter(|b| b.active)
    }

    /// The single active reference bus.
    ///
    /// Zero or multiple active reference buses are configuration errors.
    pub fn reference_bus(&self) -> ModelResult<BusId> {
        let refs: Vec<BusId> = self
            .active_buses()
            .filter(|b| b.kind == BusKind::Ref)
            .map(|b| b.number)
            .collect();
        match refs.as_slice() {
            [] => Err(ModelError::NoReferenceBus),
            [one] => Ok(*one),
            _ => Err(ModelError::MultipleReferenceBuses(refs)),
        }
    }

    /// Validate the solve-time invariants: at least one active bus, exactly
    /// one active reference bus, and no active bus islanded from it.
    pub fn validate(&self) -> ModelResult<()> {
        topology::check_connectivity(self)
    }

    /// Clear all result fields.
    pub fn clear_results(&mut self) {
        for bus in self.buses.values_mut() {
            bus.v_result = None;
            bus.angle_result = None;
        }
    }

    /// Compute basic statistics about the network.
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            num_buses: self.buses.len(),
            num_active_buses: self.active_buses().count(),
            num_branches: self.branches.len(),
            num_active_branches: self.active_branches().count(),
            total_load_mw: self.buses.values().map(|b| b.p_load).sum(),
            total_gen_mw: self.buses.values().map(|b| b.p_gen).sum(),
        }
    }
}

/// Statistics about a network's size and specified power
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_active_buses: usize,
    pub num_branches: usize,
    pub num_active_branches: usize,
    pub total_load_mw: Megawatts,
    pub total_gen_mw: Megawatts,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses ({} active), {} branches ({} active), load {:.1} MW, generation {:.1} MW",
            self.num_buses,
            self.num_active_buses,
            self.num_branches,
            self.num_active_branches,
            self.total_load_mw.value(),
            self.total_gen_mw.value()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_records() -> (Vec<Bus>, Vec<Branch>) {
        let buses = vec![
            Bus::new(1, "SLACK", "2").with_generation(50.0, 0.0),
            Bus::new(2, "LOAD", "0").with_load(50.0, 10.0),
        ];
        let branches = vec![Branch::line(1, 2, 1, 0.01, 0.1)];
        (buses, branches)
    }

    #[test]
    fn test_bus_kind_from_type_code() {
        assert_eq!(BusKind::from_type_code("2"), BusKind::Ref);
        assert_eq!(BusKind::from_type_code("1"), BusKind::Pv);
        assert_eq!(BusKind::from_type_code("0"), BusKind::Pq);
        assert_eq!(BusKind::from_type_code(""), BusKind::Pq);
        // Slack marker wins over generator marker
        assert_eq!(BusKind::from_type_code("12"), BusKind::Ref);
    }

    #[test]
    fn test_load_and_stats() {
        let (buses, branches) = two_bus_records();
        let network = Network::load("case", buses, branches).unwrap();
        let stats = network.stats();
        assert_eq!(stats.num_buses, 2);
        assert_eq!(stats.num_active_branches, 1);
        assert!((stats.total_load_mw.value() - 50.0).abs() < 1e-12);
        let summary = stats.to_string();
        assert!(summary.contains("2 buses"));
        assert!(summary.contains("load 50.0 MW"));
    }

    #[test]
    fn test_clear_results() {
        let (buses, branches) = two_bus_records();
        let mut network = Network::load("case", buses, branches).unwrap();
        network.bus_mut(BusId::new(2)).unwrap().v_result = Some(PerUnit(0.97));
        network.bus_mut(BusId::new(2)).unwrap().angle_result = Some(Radians(-0.1));

        network.clear_results();
        let bus = network.bus(BusId::new(2)).unwrap();
        assert!(bus.v_result.is_none());
        assert!(bus.angle_result.is_none());
    }

    #[test]
    fn test_load_rejects_duplicate_bus() {
        let buses = vec![Bus::new(1, "A", "2"), Bus::new(1, "B", "0")];
        let err = Network::load("dup", buses, vec![]).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateBus(id) if id.value() == 1));
    }

    #[test]
    fn test_load_rejects_bus_number_zero() {
        let buses = vec![Bus::default()];
        let err = Network::load("zero", buses, vec![]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidBusNumber));
    }

    #[test]
    fn test_load_rejects_unknown_endpoint() {
        let buses = vec![Bus::new(1, "A", "2")];
        let branches = vec![Branch::line(1, 9, 1, 0.01, 0.1)];
        let err = Network::load("bad", buses, branches).unwrap_err();
        assert!(matches!(err, ModelError::UnknownEndpoint { bus, .. } if bus.value() == 9));
    }

    #[test]
    fn test_load_rejects_duplicate_branch() {
        let (buses, _) = two_bus_records();
        let branches = vec![
            Branch::line(1, 2, 1, 0.01, 0.1),
            Branch::line(1, 2, 1, 0.02, 0.2),
        ];
        let err = Network::load("dup", buses, branches).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateBranch(_)));
    }

    #[test]
    fn test_parallel_circuits_allowed() {
        let (buses, _) = two_bus_records();
        let branches = vec![
            Branch::line(1, 2, 1, 0.01, 0.1),
            Branch::line(1, 2, 2, 0.01, 0.1),
        ];
        let network = Network::load("parallel", buses, branches).unwrap();
        assert_eq!(network.branches.len(), 2);
    }

    #[test]
    fn test_restore_discards_edits_and_results() {
        let (buses, branches) = two_bus_records();
        let mut network = Network::load("case", buses, branches).unwrap();

        let id = BusId::new(2);
        network.bus_mut(id).unwrap().active = false;
        network.bus_mut(id).unwrap().v_result = Some(PerUnit(0.97));
        network
            .branch_mut(BranchKey {
                from: BusId::new(1),
                to: BusId::new(2),
                circuit: 1,
            })
            .unwrap()
            .active = false;

        network.restore();

        let bus = network.bus(id).unwrap();
        assert!(bus.active);
        assert!(bus.v_result.is_none());
        assert!(network.active_branches().count() == 1);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let (buses, branches) = two_bus_records();
        let mut network = Network::load("case", buses, branches).unwrap();
        network.bus_mut(BusId::new(2)).unwrap().voltage = PerUnit(0.9);

        network.restore();
        let first = serde_json::to_string(&network).unwrap();
        network.restore();
        let second = serde_json::to_string(&network).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reference_bus_detection() {
        let (buses, branches) = two_bus_records();
        let mut network = Network::load("case", buses, branches).unwrap();
        assert_eq!(network.reference_bus().unwrap().value(), 1);

        network.bus_mut(BusId::new(1)).unwrap().active = false;
        assert!(matches!(
            network.reference_bus(),
            Err(ModelError::NoReferenceBus)
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let (buses, branches) = two_bus_records();
        let network = Network::load("case", buses, branches).unwrap();
        let json = serde_json::to_string(&network).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back.title, "case");
        assert_eq!(back.buses.len(), 2);
        assert_eq!(back.bus(BusId::new(2)).unwrap().kind, BusKind::Pq);

        // Branch tables are keyed by the readable identity string
        assert!(json.contains("\"1-2-1\""));
        let key: BranchKey = "1-2-1".parse().unwrap();
        assert!(back.branches.contains_key(&key));
    }

    #[test]
    fn test_branch_key_parse_rejects_garbage() {
        assert!("1-2-1".parse::<BranchKey>().is_ok());
        assert!("1-2".parse::<BranchKey>().is_err());
        assert!("1-2-1-9".parse::<BranchKey>().is_err());
        assert!("a-b-c".parse::<BranchKey>().is_err());
    }
}
