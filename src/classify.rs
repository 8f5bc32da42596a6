use crate::{
    angle::calculate_angle,
    landmark::{LandmarkKind::*, Landmarks},
};
use std::fmt;
use tracing::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PoseLabel {
    WarriorII,
    T,
    Tree,
    Unknown,
}

impl PoseLabel {
    /// BGR color to write the label in: green when recognized, red otherwise.
    pub(crate) fn color(self) -> (f64, f64, f64) {
        match self {
            Self::Unknown => (0.0, 0.0, 255.0),
            _ => (0.0, 255.0, 0.0),
        }
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WarriorII => "Warrior II Pose",
            Self::T => "T Pose",
            Self::Tree => "Tree Pose",
            Self::Unknown => "Unknown Pose",
        })
    }
}

/// The joint angles the rules are written against, in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct JointAngles {
    pub(crate) left_elbow: f32,
    pub(crate) right_elbow: f32,
    pub(crate) left_shoulder: f32,
    pub(crate) right_shoulder: f32,
    pub(crate) left_knee: f32,
    pub(crate) right_knee: f32,
}

impl JointAngles {
    pub(crate) fn measure(landmarks: &Landmarks) -> Self {
        let angle = |a, b, c| calculate_angle(landmarks[a], landmarks[b], landmarks[c]);
        Self {
            left_elbow: angle(LeftShoulder, LeftElbow, LeftWrist),
            right_elbow: angle(RightShoulder, RightElbow, RightWrist),
            // the two sides sweep in opposite directions so both read ~90 with arms out
            left_shoulder: angle(LeftElbow, LeftShoulder, LeftHip),
            right_shoulder: angle(RightHip, RightShoulder, RightElbow),
            left_knee: angle(LeftHip, LeftKnee, LeftAnkle),
            right_knee: angle(RightHip, RightKnee, RightAnkle),
        }
    }

    fn arms_straight_and_level(&self) -> bool {
        within(self.left_elbow, 165.0, 195.0)
            && within(self.right_elbow, 165.0, 195.0)
            && within(self.left_shoulder, 80.0, 110.0)
            && within(self.right_shoulder, 80.0, 110.0)
    }

    fn either_knee_within(&self, low: f32, high: f32) -> bool {
        within(self.left_knee, low, high) || within(self.right_knee, low, high)
    }
}

/// Open interval test. NaN is never within any interval.
fn within(angle: f32, low: f32, high: f32) -> bool {
    angle > low && angle < high
}

struct Rule {
    label: PoseLabel,
    matches: fn(&JointAngles) -> bool,
}

/// Rules in priority order, lowest first.
const RULES: [Rule; 3] = [
    Rule {
        label: PoseLabel::WarriorII,
        matches: |angles| {
            angles.arms_straight_and_level()
                && angles.either_knee_within(165.0, 195.0)
                && angles.either_knee_within(90.0, 120.0)
        },
    },
    Rule {
        label: PoseLabel::T,
        matches: |angles| {
            angles.arms_straight_and_level()
                && within(angles.left_knee, 160.0, 195.0)
                && within(angles.right_knee, 160.0, 195.0)
        },
    },
    Rule {
        label: PoseLabel::Tree,
        matches: |angles| {
            angles.either_knee_within(165.0, 195.0)
                && (within(angles.left_knee, 315.0, 335.0)
                    || within(angles.right_knee, 25.0, 45.0))
        },
    },
];

/// Every rule is tested; the last one that matches decides the label.
fn last_match(rules: &[Rule], angles: &JointAngles) -> PoseLabel {
    rules
        .iter()
        .rev()
        .find(|rule| (rule.matches)(angles))
        .map_or(PoseLabel::Unknown, |rule| rule.label)
}

pub(crate) fn classify_angles(angles: &JointAngles) -> PoseLabel {
    last_match(&RULES, angles)
}

pub(crate) fn classify(landmarks: &Landmarks) -> PoseLabel {
    let angles = JointAngles::measure(landmarks);
    let label = classify_angles(&angles);
    trace!(?angles, %label);
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angles(elbows: f32, shoulders: f32, left_knee: f32, right_knee: f32) -> JointAngles {
        JointAngles {
            left_elbow: elbows,
            right_elbow: elbows,
            left_shoulder: shoulders,
            right_shoulder: shoulders,
            left_knee,
            right_knee,
        }
    }

    mod last_match_tests {
        use super::*;

        const ANY: fn(&JointAngles) -> bool = |_| true;
        const NONE: fn(&JointAngles) -> bool = |_| false;

        #[test]
        fn later_rule_overrides_earlier() {
            let rules = [
                Rule {
                    label: PoseLabel::WarriorII,
                    matches: ANY,
                },
                Rule {
                    label: PoseLabel::Tree,
                    matches: ANY,
                },
            ];
            assert_eq!(last_match(&rules, &angles(0.0, 0.0, 0.0, 0.0)), PoseLabel::Tree);
        }

        #[test]
        fn earlier_rule_survives_later_miss() {
            let rules = [
                Rule {
                    label: PoseLabel::T,
                    matches: ANY,
                },
                Rule {
                    label: PoseLabel::Tree,
                    matches: NONE,
                },
            ];
            assert_eq!(last_match(&rules, &angles(0.0, 0.0, 0.0, 0.0)), PoseLabel::T);
        }

        #[test]
        fn no_rules_is_unknown() {
            assert_eq!(last_match(&[], &angles(0.0, 0.0, 0.0, 0.0)), PoseLabel::Unknown);
        }

        #[test]
        fn priority_order() {
            let labels: Vec<_> = RULES.iter().map(|rule| rule.label).collect();
            assert_eq!(labels, vec![PoseLabel::WarriorII, PoseLabel::T, PoseLabel::Tree]);
        }
    }

    mod classify_angles_tests {
        use super::*;

        #[test]
        fn warrior_two() {
            assert_eq!(classify_angles(&angles(180.0, 95.0, 180.0, 105.0)), PoseLabel::WarriorII);
            assert_eq!(classify_angles(&angles(180.0, 95.0, 105.0, 180.0)), PoseLabel::WarriorII);
        }

        #[test]
        fn t_pose() {
            assert_eq!(classify_angles(&angles(180.0, 95.0, 180.0, 180.0)), PoseLabel::T);
        }

        #[test]
        fn t_pose_needs_both_knees_straight() {
            let set = angles(180.0, 95.0, 170.0, 162.0);
            assert!(!(RULES[0].matches)(&set));
            assert_eq!(classify_angles(&set), PoseLabel::T);
        }

        #[test]
        fn tree_pose_left_leg_bent() {
            assert_eq!(classify_angles(&angles(40.0, 10.0, 325.0, 180.0)), PoseLabel::Tree);
        }

        #[test]
        fn tree_pose_right_leg_bent() {
            assert_eq!(classify_angles(&angles(40.0, 10.0, 180.0, 35.0)), PoseLabel::Tree);
        }

        #[test]
        fn tree_pose_ignores_arms() {
            assert_eq!(classify_angles(&angles(180.0, 95.0, 180.0, 35.0)), PoseLabel::Tree);
            assert_eq!(classify_angles(&angles(120.0, 170.0, 325.0, 170.0)), PoseLabel::Tree);
        }

        #[test]
        fn boundaries_are_exclusive() {
            assert_eq!(classify_angles(&angles(165.0, 95.0, 180.0, 105.0)), PoseLabel::Unknown);
            assert_eq!(classify_angles(&angles(180.0, 110.0, 180.0, 105.0)), PoseLabel::Unknown);
            assert_eq!(classify_angles(&angles(180.0, 95.0, 180.0, 120.0)), PoseLabel::Unknown);
            assert_eq!(classify_angles(&angles(0.0, 0.0, 180.0, 45.0)), PoseLabel::Unknown);
            assert_eq!(classify_angles(&angles(0.0, 0.0, 315.0, 180.0)), PoseLabel::Unknown);
        }

        #[test]
        fn unknown_outside_all_ranges() {
            assert_eq!(classify_angles(&angles(90.0, 45.0, 90.0, 90.0)), PoseLabel::Unknown);
            assert_eq!(classify_angles(&angles(0.0, 0.0, 0.0, 0.0)), PoseLabel::Unknown);
        }

        #[test]
        fn nan_is_unknown() {
            assert_eq!(
                classify_angles(&angles(f32::NAN, f32::NAN, f32::NAN, f32::NAN)),
                PoseLabel::Unknown
            );
            assert_eq!(classify_angles(&angles(180.0, 95.0, f32::NAN, 105.0)), PoseLabel::Unknown);
        }
    }

    mod classify_tests {
        use super::*;
        use crate::landmark::{Landmark, LandmarkKind, NUM_LANDMARKS};

        fn landmarks(points: &[(LandmarkKind, (f32, f32))]) -> Landmarks {
            let mut raw = [Landmark::default(); NUM_LANDMARKS];
            for &(kind, (x, y)) in points {
                raw[kind.idx().unwrap()] = Landmark::new(x, y, 0.0);
            }
            Landmarks::new(raw)
        }

        /// Arms stretched out sideways at shoulder height, as seen by the camera.
        fn arms_out() -> Vec<(LandmarkKind, (f32, f32))> {
            vec![
                (RightWrist, (100.0, 200.0)),
                (RightElbow, (200.0, 200.0)),
                (RightShoulder, (300.0, 200.0)),
                (LeftShoulder, (400.0, 200.0)),
                (LeftElbow, (500.0, 200.0)),
                (LeftWrist, (600.0, 200.0)),
                (RightHip, (310.0, 400.0)),
                (LeftHip, (390.0, 400.0)),
            ]
        }

        #[test]
        fn t_pose_from_landmarks() {
            let mut points = arms_out();
            points.extend(vec![
                (RightKnee, (310.0, 550.0)),
                (RightAnkle, (310.0, 700.0)),
                (LeftKnee, (390.0, 550.0)),
                (LeftAnkle, (390.0, 700.0)),
            ]);
            let landmarks = landmarks(&points);
            let angles = JointAngles::measure(&landmarks);
            assert!(within(angles.left_shoulder, 80.0, 110.0), "{:?}", angles);
            assert!(within(angles.right_shoulder, 80.0, 110.0), "{:?}", angles);
            assert_eq!(classify(&landmarks), PoseLabel::T);
        }

        #[test]
        fn warrior_two_from_landmarks() {
            let mut points = arms_out();
            // right leg lunges sideways with the knee over the ankle
            points.extend(vec![
                (RightKnee, (170.0, 470.0)),
                (RightAnkle, (170.0, 620.0)),
                (LeftKnee, (390.0, 550.0)),
                (LeftAnkle, (390.0, 700.0)),
            ]);
            let landmarks = landmarks(&points);
            let angles = JointAngles::measure(&landmarks);
            assert!(within(angles.right_knee, 90.0, 120.0), "{:?}", angles);
            assert_eq!(classify(&landmarks), PoseLabel::WarriorII);
        }

        #[test]
        fn tree_pose_from_landmarks() {
            let landmarks = landmarks(&[
                (RightShoulder, (300.0, 200.0)),
                (RightElbow, (280.0, 120.0)),
                (RightWrist, (340.0, 60.0)),
                (LeftShoulder, (400.0, 200.0)),
                (LeftElbow, (420.0, 120.0)),
                (LeftWrist, (360.0, 60.0)),
                (RightHip, (310.0, 400.0)),
                (RightKnee, (310.0, 550.0)),
                (RightAnkle, (310.0, 700.0)),
                // left foot tucked against the standing leg
                (LeftHip, (390.0, 400.0)),
                (LeftKnee, (520.0, 480.0)),
                (LeftAnkle, (330.0, 520.0)),
            ]);
            let angles = JointAngles::measure(&landmarks);
            assert!(within(angles.left_knee, 315.0, 335.0), "{:?}", angles);
            assert_eq!(classify(&landmarks), PoseLabel::Tree);
        }

        #[test]
        fn all_zero_landmarks_are_unknown() {
            assert_eq!(classify(&landmarks(&[])), PoseLabel::Unknown);
        }
    }

    #[test]
    fn display_labels() {
        assert_eq!(PoseLabel::WarriorII.to_string(), "Warrior II Pose");
        assert_eq!(PoseLabel::T.to_string(), "T Pose");
        assert_eq!(PoseLabel::Tree.to_string(), "Tree Pose");
        assert_eq!(PoseLabel::Unknown.to_string(), "Unknown Pose");
    }

    #[test]
    fn label_colors() {
        assert_eq!(PoseLabel::Unknown.color(), (0.0, 0.0, 255.0));
        assert_eq!(PoseLabel::Tree.color(), (0.0, 255.0, 0.0));
    }
}
