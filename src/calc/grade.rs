use serde::{Deserialize, Serialize};
use std::fmt;

/// Letter grade. Variant order is quality order, so `Grade::F < Grade::APlus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    F,
    D,
    C,
    B,
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Lower bound of each band is inclusive.
const BANDS: [(f64, Grade); 5] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::B),
    (60.0, Grade::C),
    (50.0, Grade::D),
];

pub fn grade_for(percentage: f64) -> Grade {
    BANDS
        .iter()
        .find(|(floor, _)| percentage >= *floor)
        .map(|(_, g)| *g)
        .unwrap_or(Grade::F)
}
