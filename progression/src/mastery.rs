//! Mastery state machine.
//!
//! Pure functions over a student's full mastery map. No I/O happens here;
//! callers load the model, apply one or more updates, and persist the
//! result. Progress is monotonic except for [`reset_status`].
//!
//! States: locked -> unlocked -> learning -> {mastered, perfect}.

use chrono::{DateTime, Utc};
use tracing::debug;

use curriculum::SkillCatalog;

use crate::config::MasteryConfig;
use crate::types::{SkillMastery, SkillStatus, StudentModel};

/// Get or lazily create the mastery entry for a skill.
///
/// Fresh entries default to locked, or unlocked when the skill has no
/// prerequisites. Unknown skill ids are synthesized as locked rather than
/// rejected; ids are assumed to originate from the catalog.
pub fn ensure_entry<'a>(
    catalog: &SkillCatalog,
    model: &'a mut StudentModel,
    skill_id: &str,
    now: DateTime<Utc>,
) -> &'a mut SkillMastery {
    model.skills.entry(skill_id.to_string()).or_insert_with(|| {
        let entry_point = catalog
            .get(skill_id)
            .map(|s| s.is_entry_point())
            .unwrap_or(false);
        if entry_point {
            SkillMastery::unlocked(skill_id, now)
        } else {
            SkillMastery::locked(skill_id)
        }
    })
}

/// Apply a score-based update (exponential moving average).
///
/// `new_level = round(old * (1 - alpha) + score * alpha)`, floored at the
/// score itself when the score clears the mastery threshold - one strong
/// result cannot be dragged down by a low history.
pub fn apply_score(
    catalog: &SkillCatalog,
    model: &mut StudentModel,
    skill_id: &str,
    score: u8,
    cfg: &MasteryConfig,
    now: DateTime<Utc>,
) {
    let score = score.min(100);
    let entry = ensure_entry(catalog, model, skill_id, now);

    entry.attempts += 1;
    entry.last_attempt = Some(now);

    let old = entry.mastery_level as f64;
    let smoothed = (old * (1.0 - cfg.ema_alpha) + score as f64 * cfg.ema_alpha).round() as u8;
    let mut new_level = smoothed.min(100);
    if score >= cfg.mastered_threshold {
        new_level = new_level.max(score);
    }
    entry.mastery_level = new_level;

    entry.best_score = Some(entry.best_score.map_or(score, |b| b.max(score)));

    let reached = if score >= cfg.perfect_threshold || new_level >= cfg.perfect_threshold {
        SkillStatus::Perfect
    } else if score >= cfg.mastered_threshold || new_level >= cfg.mastered_threshold {
        SkillStatus::Mastered
    } else {
        SkillStatus::Learning
    };

    let next = entry.status.max(reached);
    if next.is_mastered() && entry.mastered_at.is_none() {
        entry.mastered_at = Some(now);
    }
    if next != entry.status {
        debug!(
            skill_id,
            from = ?entry.status,
            to = ?next,
            level = entry.mastery_level,
            "Skill status advanced"
        );
    }
    entry.status = next;
}

/// Apply one qualifying practice success on the discrete rank path.
///
/// Rank climbs toward the cap; each step raises the mastery level to at
/// least `min(rank, 2) * rank_level_step` without lowering a higher
/// existing level. Reaching the cap forces a score-based update with the
/// completion score (guaranteeing mastered status) and then restores the
/// rank to exactly the cap, protecting it from the generic score path
/// which knows nothing about ranks.
pub fn rank_up(
    catalog: &SkillCatalog,
    model: &mut StudentModel,
    skill_id: &str,
    cfg: &MasteryConfig,
    now: DateTime<Utc>,
) {
    let completion_score = cfg.rank_completion_score;
    let rank_cap = cfg.rank_cap;

    let entry = ensure_entry(catalog, model, skill_id, now);
    entry.last_practiced = Some(now);

    let reached_cap = if entry.rank < rank_cap {
        entry.rank += 1;
        entry.rank == rank_cap
    } else {
        false
    };

    let floor = entry.rank.min(2).saturating_mul(cfg.rank_level_step);
    entry.mastery_level = entry.mastery_level.max(floor);

    if reached_cap {
        apply_score(catalog, model, skill_id, completion_score, cfg, now);
        if let Some(entry) = model.skills.get_mut(skill_id) {
            entry.rank = rank_cap;
        }
    }
}

/// Unlock cascade: one flat pass over the catalog.
///
/// Every skill not yet in an active state whose prerequisites are all
/// mastered (or absent) flips to unlocked. Idempotent; re-run after every
/// mastery event. Deliberately single-hop per invocation - mastering one
/// skill unlocks its direct dependents in this pass, nothing transitive.
pub fn unlock_cascade(
    catalog: &SkillCatalog,
    model: &mut StudentModel,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut newly_unlocked = Vec::new();

    for skill in catalog.skills() {
        let already_active = model
            .skills
            .get(&skill.id)
            .map(|e| e.status.is_active())
            .unwrap_or(false);
        if already_active {
            continue;
        }

        let ready = skill.prerequisites.is_empty()
            || skill.prerequisites.iter().all(|p| {
                model
                    .skills
                    .get(p)
                    .map(|e| e.status.is_mastered())
                    .unwrap_or(false)
            });

        if ready {
            let entry = model
                .skills
                .entry(skill.id.clone())
                .or_insert_with(|| SkillMastery::locked(&skill.id));
            entry.status = SkillStatus::Unlocked;
            entry.unlocked_at = Some(now);
            newly_unlocked.push(skill.id.clone());
        }
    }

    if !newly_unlocked.is_empty() {
        debug!(count = newly_unlocked.len(), "Unlock cascade promoted skills");
    }

    newly_unlocked
}

/// Bulk mastery ("skip challenge"): master every skill in the target set,
/// then run the unlock cascade once.
pub fn master_all(
    catalog: &SkillCatalog,
    model: &mut StudentModel,
    skill_ids: &[String],
    cfg: &MasteryConfig,
    now: DateTime<Utc>,
) -> Vec<String> {
    for skill_id in skill_ids {
        {
            let entry = ensure_entry(catalog, model, skill_id, now);
            entry.rank = cfg.rank_cap;
        }
        apply_score(catalog, model, skill_id, cfg.rank_completion_score, cfg, now);
        if let Some(entry) = model.skills.get_mut(skill_id) {
            entry.rank = cfg.rank_cap;
        }
    }

    unlock_cascade(catalog, model, now)
}

/// Explicit demotion - the only path that lowers a status.
///
/// Clears `masteredAt` when the skill leaves a mastered state.
pub fn reset_status(
    model: &mut StudentModel,
    skill_id: &str,
    to: SkillStatus,
    _now: DateTime<Utc>,
) {
    if let Some(entry) = model.skills.get_mut(skill_id) {
        if entry.status.is_mastered() && !to.is_mastered() {
            entry.mastered_at = None;
        }
        entry.status = to;
    }
}

/// Self-healing migration applied by the store on load.
///
/// A mastered or perfect record found with rank below the cap gets its
/// rank forced to the cap. Never demotes anything.
pub fn repair(model: &mut StudentModel, cfg: &MasteryConfig) -> usize {
    let mut repaired = 0;
    for entry in model.skills.values_mut() {
        if entry.status.is_mastered() && entry.rank < cfg.rank_cap {
            entry.rank = cfg.rank_cap;
            repaired += 1;
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use curriculum::{Importance, SkillDefinition};

    fn catalog() -> SkillCatalog {
        SkillCatalog::new(vec![
            SkillDefinition::new("a", "A", "foundation").with_importance(Importance::Core),
            SkillDefinition::new("b", "B", "arithmetic").with_prerequisites(["a"]),
            SkillDefinition::new("c", "C", "algebra").with_prerequisites(["b"]),
        ])
        .unwrap()
    }

    fn cfg() -> MasteryConfig {
        MasteryConfig::default()
    }

    #[test]
    fn test_lazy_entry_defaults() {
        let catalog = catalog();
        let mut model = StudentModel::new("u1");
        let now = Utc::now();

        let a = ensure_entry(&catalog, &mut model, "a", now);
        assert_eq!(a.status, SkillStatus::Unlocked);
        assert!(a.unlocked_at.is_some());

        let b = ensure_entry(&catalog, &mut model, "b", now);
        assert_eq!(b.status, SkillStatus::Locked);
    }

    #[test]
    fn test_ema_update() {
        let catalog = catalog();
        let mut model = StudentModel::new("u1");
        let now = Utc::now();

        apply_score(&catalog, &mut model, "a", 50, &cfg(), now);
        // 0 * 0.7 + 50 * 0.3 = 15
        let entry = &model.skills["a"];
        assert_eq!(entry.mastery_level, 15);
        assert_eq!(entry.status, SkillStatus::Learning);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.best_score, Some(50));
    }

    #[test]
    fn test_ema_floor_on_qualifying_score() {
        // For any prior level and score >= 70, new level >= score.
        let catalog = catalog();
        let now = Utc::now();

        for prior in [0u8, 10, 40, 69, 100] {
            for score in [70u8, 80, 95, 100] {
                let mut model = StudentModel::new("u1");
                apply_score(&catalog, &mut model, "a", prior, &cfg(), now);
                let before = model.skills["a"].mastery_level;
                apply_score(&catalog, &mut model, "a", score, &cfg(), now);
                let after = model.skills["a"].mastery_level;
                assert!(
                    after >= score,
                    "prior {} (level {}), score {} gave level {}",
                    prior,
                    before,
                    score,
                    after
                );
            }
        }
    }

    #[test]
    fn test_mastery_thresholds() {
        let catalog = catalog();
        let now = Utc::now();

        let mut model = StudentModel::new("u1");
        apply_score(&catalog, &mut model, "a", 70, &cfg(), now);
        assert_eq!(model.skills["a"].status, SkillStatus::Mastered);
        assert!(model.skills["a"].mastered_at.is_some());

        let mut model = StudentModel::new("u2");
        apply_score(&catalog, &mut model, "a", 95, &cfg(), now);
        assert_eq!(model.skills["a"].status, SkillStatus::Perfect);
    }

    #[test]
    fn test_low_score_never_demotes() {
        let catalog = catalog();
        let now = Utc::now();
        let mut model = StudentModel::new("u1");

        apply_score(&catalog, &mut model, "a", 95, &cfg(), now);
        assert_eq!(model.skills["a"].status, SkillStatus::Perfect);

        apply_score(&catalog, &mut model, "a", 10, &cfg(), now);
        assert_eq!(model.skills["a"].status, SkillStatus::Perfect);
    }

    #[test]
    fn test_rank_path_reconciles_with_status() {
        // After rank reaches 3, status is mastered and rank stays 3.
        let catalog = catalog();
        let now = Utc::now();
        let mut model = StudentModel::new("u1");

        rank_up(&catalog, &mut model, "a", &cfg(), now);
        assert_eq!(model.skills["a"].rank, 1);
        assert!(model.skills["a"].mastery_level >= 33);

        rank_up(&catalog, &mut model, "a", &cfg(), now);
        assert_eq!(model.skills["a"].rank, 2);
        assert!(model.skills["a"].mastery_level >= 66);

        rank_up(&catalog, &mut model, "a", &cfg(), now);
        let entry = &model.skills["a"];
        assert_eq!(entry.rank, 3);
        assert!(entry.status.is_mastered());
        assert!(entry.mastery_level >= 90);

        // Practicing past the cap changes nothing structural.
        rank_up(&catalog, &mut model, "a", &cfg(), now);
        assert_eq!(model.skills["a"].rank, 3);
    }

    #[test]
    fn test_unlock_cascade_idempotent() {
        // Running the cascade twice produces no further change.
        let catalog = catalog();
        let now = Utc::now();
        let mut model = StudentModel::new("u1");

        let first = unlock_cascade(&catalog, &mut model, now);
        assert_eq!(first, vec!["a".to_string()]);

        let second = unlock_cascade(&catalog, &mut model, now);
        assert!(second.is_empty());
    }

    #[test]
    fn test_cascade_after_mastery() {
        let catalog = catalog();
        let now = Utc::now();
        let mut model = StudentModel::new("u1");

        unlock_cascade(&catalog, &mut model, now);
        apply_score(&catalog, &mut model, "a", 80, &cfg(), now);

        let unlocked = unlock_cascade(&catalog, &mut model, now);
        assert_eq!(unlocked, vec!["b".to_string()]);
        // Single-hop: c stays locked until b is mastered.
        assert!(model
            .skills
            .get("c")
            .map(|e| e.status == SkillStatus::Locked)
            .unwrap_or(true));
    }

    #[test]
    fn test_master_all_runs_cascade_once() {
        let catalog = catalog();
        let now = Utc::now();
        let mut model = StudentModel::new("u1");

        let unlocked = master_all(
            &catalog,
            &mut model,
            &["a".to_string(), "b".to_string()],
            &cfg(),
            now,
        );

        assert!(model.skills["a"].status.is_mastered());
        assert_eq!(model.skills["a"].rank, 3);
        assert!(model.skills["b"].status.is_mastered());
        assert_eq!(unlocked, vec!["c".to_string()]);
    }

    #[test]
    fn test_reset_clears_mastered_at() {
        let catalog = catalog();
        let now = Utc::now();
        let mut model = StudentModel::new("u1");

        apply_score(&catalog, &mut model, "a", 90, &cfg(), now);
        assert!(model.skills["a"].mastered_at.is_some());

        reset_status(&mut model, "a", SkillStatus::Learning, now);
        assert_eq!(model.skills["a"].status, SkillStatus::Learning);
        assert!(model.skills["a"].mastered_at.is_none());
    }

    #[test]
    fn test_repair_forces_rank() {
        let mut model = StudentModel::new("u1");
        let mut entry = SkillMastery::locked("a");
        entry.status = SkillStatus::Mastered;
        entry.rank = 1;
        model.skills.insert("a".to_string(), entry);

        let repaired = repair(&mut model, &cfg());
        assert_eq!(repaired, 1);
        assert_eq!(model.skills["a"].rank, 3);
        // Repair never demotes
        assert_eq!(model.skills["a"].status, SkillStatus::Mastered);
    }
}
