// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Boolean combination of brush `a` with brush `b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Union
    Addition,
    /// `a` minus `b`
    Subtraction,
    /// `b` minus `a`
    ReverseSubtraction,
    /// Symmetric difference, the shared volume hollowed out of both
    Difference,
    Intersection,
    /// Surface of `a` outside `b`, without capping faces from `b`
    HollowSubtraction,
    /// Surface of `a` inside `b`, without capping faces from `b`
    HollowIntersection,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Addition,
        Operation::Subtraction,
        Operation::ReverseSubtraction,
        Operation::Difference,
        Operation::Intersection,
        Operation::HollowSubtraction,
        Operation::HollowIntersection,
    ];

    /// Hollow operations keep only the surface of `a`
    pub fn is_hollow(self) -> bool {
        matches!(
            self,
            Operation::HollowSubtraction | Operation::HollowIntersection
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Addition => "addition",
            Operation::Subtraction => "subtraction",
            Operation::ReverseSubtraction => "reverse-subtraction",
            Operation::Difference => "difference",
            Operation::Intersection => "intersection",
            Operation::HollowSubtraction => "hollow-subtraction",
            Operation::HollowIntersection => "hollow-intersection",
        }
    }

    /// What to do with a fragment on `side` of the other brush. `invert` is
    /// set for fragments of `b` (the brush being cut into `a`).
    pub fn action(self, side: FragmentSide, invert: bool) -> Action {
        use FragmentSide::*;
        use Operation::*;

        let add = match self {
            Addition => side == Front || (side == CoplanarAligned && !invert),
            Subtraction => {
                if invert {
                    return if side == Back { Action::Invert } else { Action::Skip };
                }
                side == Front || side == CoplanarOpposite
            }
            ReverseSubtraction => {
                if !invert {
                    return if side == Back { Action::Invert } else { Action::Skip };
                }
                side == Front || side == CoplanarOpposite
            }
            Difference => {
                if side == Back {
                    return Action::Invert;
                }
                side == Front
            }
            Intersection => side == Back || (side == CoplanarAligned && !invert),
            HollowSubtraction => !invert && (side == Front || side == CoplanarOpposite),
            HollowIntersection => !invert && (side == Back || side == CoplanarAligned),
        };

        if add {
            Action::Add
        } else {
            Action::Skip
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| format!("unknown CSG operation: {}", s))
    }
}

/// Position of a fragment relative to the other brush's surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FragmentSide {
    /// Outside
    Front,
    /// Inside
    Back,
    /// On the surface with matching orientation
    CoplanarAligned,
    /// On the surface facing the other way
    CoplanarOpposite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    /// Add with reversed winding and negated normals
    Invert,
    Skip,
}

#[cfg(test)]
mod tests {
    use super::*;
    use FragmentSide::*;

    #[test]
    fn test_addition_keeps_outside() {
        let op = Operation::Addition;
        assert_eq!(op.action(Front, false), Action::Add);
        assert_eq!(op.action(Front, true), Action::Add);
        assert_eq!(op.action(Back, false), Action::Skip);
        assert_eq!(op.action(CoplanarAligned, false), Action::Add);
        assert_eq!(op.action(CoplanarAligned, true), Action::Skip);
        assert_eq!(op.action(CoplanarOpposite, false), Action::Skip);
    }

    #[test]
    fn test_subtraction_inverts_inside_of_b() {
        let op = Operation::Subtraction;
        assert_eq!(op.action(Front, false), Action::Add);
        assert_eq!(op.action(CoplanarOpposite, false), Action::Add);
        assert_eq!(op.action(Back, false), Action::Skip);
        assert_eq!(op.action(Back, true), Action::Invert);
        assert_eq!(op.action(Front, true), Action::Skip);
        assert_eq!(op.action(CoplanarOpposite, true), Action::Skip);

        let reverse = Operation::ReverseSubtraction;
        assert_eq!(reverse.action(Back, false), Action::Invert);
        assert_eq!(reverse.action(Front, false), Action::Skip);
        assert_eq!(reverse.action(Front, true), Action::Add);
        assert_eq!(reverse.action(CoplanarOpposite, true), Action::Add);
    }

    #[test]
    fn test_difference_and_intersection() {
        let op = Operation::Difference;
        for invert in [false, true] {
            assert_eq!(op.action(Back, invert), Action::Invert);
            assert_eq!(op.action(Front, invert), Action::Add);
            assert_eq!(op.action(CoplanarAligned, invert), Action::Skip);
        }

        let op = Operation::Intersection;
        assert_eq!(op.action(Back, true), Action::Add);
        assert_eq!(op.action(CoplanarAligned, false), Action::Add);
        assert_eq!(op.action(CoplanarAligned, true), Action::Skip);
        assert_eq!(op.action(Front, false), Action::Skip);
    }

    #[test]
    fn test_hollow_operations_ignore_b() {
        for side in [Front, Back, CoplanarAligned, CoplanarOpposite] {
            assert_eq!(Operation::HollowSubtraction.action(side, true), Action::Skip);
            assert_eq!(Operation::HollowIntersection.action(side, true), Action::Skip);
        }
        assert_eq!(Operation::HollowSubtraction.action(Front, false), Action::Add);
        assert_eq!(Operation::HollowIntersection.action(CoplanarAligned, false), Action::Add);
        assert!(Operation::HollowIntersection.is_hollow());
        assert!(!Operation::Difference.is_hollow());
    }

    #[test]
    fn test_parse() {
        assert_eq!("subtraction".parse::<Operation>().unwrap(), Operation::Subtraction);
        assert_eq!(
            "Reverse_Subtraction".parse::<Operation>().unwrap(),
            Operation::ReverseSubtraction
        );
        assert!("union".parse::<Operation>().is_err());
        for op in Operation::ALL {
            assert_eq!(op.to_string().parse::<Operation>().unwrap(), op);
        }
    }
}
