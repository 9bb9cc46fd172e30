//! HeatDescriptor - what the server announces with `heat-ready`

use serde::{Deserialize, Serialize};

/// Number of racing lanes on the track
pub const LANE_COUNT: usize = 4;

/// Elapsed time per lane in seconds; 0.0 means no reading
pub type LaneTimes = [f64; LANE_COUNT];

/// Bit mask of occupied lanes; bit 0 is lane 1.
///
/// `14` means lane 1 is empty and lanes 2, 3 and 4 carry cars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneMask(pub u32);

impl LaneMask {
    pub const ALL: LaneMask = LaneMask(0b1111);

    /// Whether lane `index` (0-based) is occupied. An empty mask counts every lane.
    pub fn contains(self, index: usize) -> bool {
        if self.0 == 0 {
            return index < LANE_COUNT;
        }
        index < LANE_COUNT && self.0 & (1 << index) != 0
    }

    /// Number of occupied lanes
    pub fn occupied(self) -> usize {
        (0..LANE_COUNT).filter(|&i| self.contains(i)).count()
    }
}

/// Heat announced by the race server
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeatDescriptor {
    pub lane_mask: LaneMask,
    pub class_name: String,
    /// Display ordinal of the round within its class
    pub round_ordinal: u32,
    /// Database-unique round identifier
    pub round_id: u32,
    /// 1-based heat number; 0 marks an aborted or cleared heat
    pub heat_number: u32,
}

impl HeatDescriptor {
    /// Whether the descriptor names a runnable heat
    pub fn is_active(&self) -> bool {
        self.heat_number != 0
    }

    /// Same heat with the heat number cleared to the sentinel 0
    pub fn aborted(&self) -> Self {
        Self {
            heat_number: 0,
            ..self.clone()
        }
    }
}
