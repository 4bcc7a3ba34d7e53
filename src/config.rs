use serde::{Deserialize, Serialize};

pub const DEFAULT_TURNS: u64 = 10_000_000_000;
pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_SIZE: i32 = 512;
pub const DEFAULT_PARTITIONS: usize = 2;

/// Parameters of one simulation run, shared by every node taking part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// number of generations to compute before stopping.
    pub turns: u64,
    /// worker threads used for one generation on a node.
    pub threads: usize,
    pub width: i32,
    pub height: i32,
    /// number of partitions the coordinator splits the rows into.
    pub partitions: usize,
}

impl Params {
    /// identifier of the initial image.
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// identifier of the snapshot taken after `turn` generations.
    pub fn output_name(&self, turn: u64) -> String {
        format!("{}x{}x{}", self.width, self.height, turn)
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            turns: DEFAULT_TURNS,
            threads: DEFAULT_THREADS,
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
            partitions: DEFAULT_PARTITIONS,
        }
    }
}

#[test]
fn test_image_names() {
    let params = Params {
        width: 16,
        height: 8,
        ..Params::default()
    };
    assert_eq!(params.input_name(), "16x8");
    assert_eq!(params.output_name(100), "16x8x100");
}
