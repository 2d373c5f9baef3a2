//! Rules placed on the board

use glam::Vec2;
use thiserror::Error;

use crate::geometry::Shape;
use crate::model::{PlayerId, Rule, RuleId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule text is empty")]
    EmptyText,

    #[error("spot is already taken by rule {0}")]
    Occupied(RuleId),
}

/// A rule together with its parsed geometry
#[derive(Debug, Clone)]
struct PlacedRule {
    rule: Rule,
    /// `None` when the stored shape data could not be parsed
    shape: Option<Shape>,
}

impl PlacedRule {
    fn new(rule: Rule) -> Self {
        let shape = Shape::from_json(&rule.data);
        if shape.is_none() {
            log::warn!("Rule {} has unreadable shape data", rule.id);
        }
        Self { rule, shape }
    }
}

/// Local mirror of the session's rules, in creation order
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<PlacedRule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a rule covering `shape`
    ///
    /// The caller is expected to have checked for overlap already; this only
    /// rejects a shape whose center sits inside an existing rule.
    pub fn create_rule(
        &mut self,
        id: RuleId,
        shape: Shape,
        author: PlayerId,
        text: &str,
    ) -> Result<Rule, RuleError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RuleError::EmptyText);
        }
        if let Some(existing) = self.rule_at(shape.center()) {
            return Err(RuleError::Occupied(existing.id.clone()));
        }

        let rule = Rule {
            id,
            player_id: author,
            display_text: text.to_string(),
            data: shape.to_json(),
            times_landed: 0,
        };
        self.rules.push(PlacedRule {
            rule: rule.clone(),
            shape: Some(shape),
        });
        Ok(rule)
    }

    /// Rule whose shape contains `point`, newest first on overlap
    pub fn rule_at(&self, point: Vec2) -> Option<&Rule> {
        self.rules
            .iter()
            .rev()
            .find(|p| p.shape.is_some_and(|s| s.contains(point)))
            .map(|p| &p.rule)
    }

    /// First rule whose shape overlaps `shape` (with margin)
    pub fn rule_overlapping(&self, shape: &Shape, margin: f32) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|p| p.shape.is_some_and(|s| s.overlaps(shape, margin)))
            .map(|p| &p.rule)
    }

    /// Bump a rule's landing counter. Unknown ids are ignored.
    pub fn increment_landing(&mut self, id: &RuleId) -> bool {
        match self.rules.iter_mut().find(|p| &p.rule.id == id) {
            Some(placed) => {
                placed.rule.times_landed += 1;
                true
            }
            None => false,
        }
    }

    /// Insert or replace from a remote snapshot
    pub fn upsert(&mut self, rule: Rule) {
        match self.rules.iter_mut().find(|p| p.rule.id == rule.id) {
            Some(placed) => {
                // Counters only move forward, even if a stale snapshot arrives
                let times_landed = placed.rule.times_landed.max(rule.times_landed);
                *placed = PlacedRule::new(rule);
                placed.rule.times_landed = times_landed;
            }
            None => self.rules.push(PlacedRule::new(rule)),
        }
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|p| &p.rule.id == id).map(|p| &p.rule)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.rules.iter().filter_map(|p| p.shape.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|p| &p.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry_with_rule() -> (RuleRegistry, Rule) {
        let mut reg = RuleRegistry::new();
        let rule = reg
            .create_rule(
                "r1".into(),
                Shape::square_around(Vec2::new(100.0, 100.0), 10.0),
                "a".into(),
                "Drink with your left hand",
            )
            .unwrap();
        (reg, rule)
    }

    #[test]
    fn test_create_then_lookup() {
        let (reg, rule) = registry_with_rule();
        assert_eq!(reg.rule_at(Vec2::new(100.0, 100.0)), Some(&rule));
        assert_eq!(reg.rule_at(Vec2::new(300.0, 300.0)), None);
        assert_eq!(rule.times_landed, 0);
        assert_eq!(rule.display_text, "Drink with your left hand");
    }

    #[test]
    fn test_create_rejects_occupied_and_blank() {
        let (mut reg, _) = registry_with_rule();
        let err = reg
            .create_rule(
                "r2".into(),
                Shape::square_around(Vec2::new(105.0, 95.0), 10.0),
                "b".into(),
                "Another",
            )
            .unwrap_err();
        assert_eq!(err, RuleError::Occupied("r1".into()));

        let err = reg
            .create_rule(
                "r3".into(),
                Shape::square_around(Vec2::new(400.0, 400.0), 10.0),
                "b".into(),
                "   ",
            )
            .unwrap_err();
        assert_eq!(err, RuleError::EmptyText);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_increment_unknown_is_noop() {
        let (mut reg, _) = registry_with_rule();
        assert!(!reg.increment_landing(&"nope".into()));
        assert_eq!(reg.get(&"r1".into()).unwrap().times_landed, 0);
    }

    #[test]
    fn test_upsert_dedups_and_keeps_counter_monotonic() {
        let (mut reg, mut rule) = registry_with_rule();
        reg.increment_landing(&rule.id);
        reg.increment_landing(&rule.id);

        // Stale echo of the original creation
        reg.upsert(rule.clone());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&rule.id).unwrap().times_landed, 2);

        rule.times_landed = 5;
        reg.upsert(rule.clone());
        assert_eq!(reg.get(&rule.id).unwrap().times_landed, 5);
    }

    #[test]
    fn test_malformed_shape_is_kept_without_geometry() {
        let mut reg = RuleRegistry::new();
        reg.upsert(Rule {
            id: "bad".into(),
            player_id: "a".into(),
            display_text: "?".into(),
            data: "{".into(),
            times_landed: 0,
        });
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.shapes().count(), 0);
        assert_eq!(reg.rule_at(Vec2::ZERO), None);
    }

    proptest! {
        #[test]
        fn prop_increment_adds_exactly_k(k in 0u32..50) {
            let (mut reg, rule) = registry_with_rule();
            for _ in 0..k {
                reg.increment_landing(&rule.id);
            }
            prop_assert_eq!(reg.get(&rule.id).unwrap().times_landed, k);
        }
    }
}
