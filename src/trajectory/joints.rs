// Joint lists, angle vectors and name -> angle maps

use std::collections::HashMap;

use crate::error::{MotionError, Result};

/// Angles in radians, index-aligned to a joint list
pub type AngleVector = Vec<f64>;

/// Angles in radians keyed by joint name
pub type JointAngleMap = HashMap<String, f64>;

fn check_len(owner: &str, joints: &[String], len: usize) -> Result<()> {
    if joints.len() != len {
        return Err(MotionError::ShapeMismatch {
            owner: owner.to_string(),
            expected: joints.len(),
            got: len,
        });
    }
    Ok(())
}

/// Overlay `map` onto `av` for every joint in `joints`.
///
/// Slots for joints absent from the map keep their value. Returns true if at
/// least one slot was written.
pub fn fill_angle_vector(
    owner: &str,
    joints: &[String],
    map: &JointAngleMap,
    av: &mut [f64],
) -> Result<bool> {
    check_len(owner, joints, av.len())?;

    let mut changed = false;
    for (slot, name) in av.iter_mut().zip(joints) {
        if let Some(&angle) = map.get(name) {
            *slot = angle;
            changed = true;
        }
    }
    Ok(changed)
}

/// Pair every joint with its angle
pub fn angle_vector_to_map(owner: &str, joints: &[String], av: &[f64]) -> Result<JointAngleMap> {
    check_len(owner, joints, av.len())?;
    Ok(joints.iter().cloned().zip(av.iter().copied()).collect())
}

/// Build a map from parallel name/position lists, stopping at the shorter one
pub fn names_to_map(names: &[String], positions: &[f64]) -> JointAngleMap {
    names.iter().cloned().zip(positions.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fill_leaves_absent_slots_untouched() {
        let list = joints(&["a", "b", "c"]);
        let map = JointAngleMap::from([("b".to_string(), 0.5), ("z".to_string(), 9.0)]);
        let mut av = vec![1.0, 2.0, 3.0];
        assert!(fill_angle_vector("test", &list, &map, &mut av).unwrap());
        assert_eq!(av, vec![1.0, 0.5, 3.0]);
    }

    #[test]
    fn test_fill_without_overlap_reports_nothing_changed() {
        let list = joints(&["a", "b"]);
        let map = JointAngleMap::from([("x".to_string(), 0.5)]);
        let mut av = vec![1.0, 2.0];
        assert!(!fill_angle_vector("test", &list, &map, &mut av).unwrap());
        assert_eq!(av, vec![1.0, 2.0]);
    }

    #[test]
    fn test_mismatched_buffer_is_an_error() {
        let list = joints(&["a", "b"]);
        let mut av = vec![0.0; 3];
        let err = fill_angle_vector("test", &list, &JointAngleMap::new(), &mut av).unwrap_err();
        assert!(matches!(
            err,
            MotionError::ShapeMismatch {
                expected: 2,
                got: 3,
                ..
            }
        ));
        assert!(angle_vector_to_map("test", &list, &[1.0]).is_err());
    }

    #[test]
    fn test_map_vector_map_round_trip() {
        let list = joints(&["a", "b", "c"]);
        let original = JointAngleMap::from([
            ("a".to_string(), 0.1),
            ("c".to_string(), -0.3),
            ("other".to_string(), 4.0),
        ]);
        let mut av = vec![0.0; 3];
        fill_angle_vector("test", &list, &original, &mut av).unwrap();
        let back = angle_vector_to_map("test", &list, &av).unwrap();
        for name in &list {
            if let Some(v) = original.get(name) {
                assert_eq!(back[name], *v);
            }
        }
        assert!(!back.contains_key("other"));
    }

    #[test]
    fn test_names_to_map_truncates_to_shorter() {
        let map = names_to_map(&joints(&["a", "b", "c"]), &[1.0, 2.0]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["b"], 2.0);
    }
}
