//! Recommendation engine.
//!
//! Pure functions that rank skills for "what next", resolve backtrack
//! rules after errors, build learning paths to a target skill, and
//! summarize overall progress. Consumes only the mastery map and the
//! static catalog.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use curriculum::{
    category_weight, BacktrackRule, BacktrackRules, ErrorSeverity, Importance, SkillCatalog,
    SkillDefinition,
};

use crate::types::{ProgressionError, Result, SkillStatus, StudentModel};

/// Fixed score assigned to skills already being learned; outranks any
/// importance + category combination.
const CONTINUE_SCORE: u32 = 1_000;

/// A ranked next-skill recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended skill
    pub skill_id: String,
    /// 1-based priority
    pub priority: usize,
    /// Additive score the ranking was computed from
    pub score: u32,
    /// Human-readable rationale
    pub reason: String,
}

/// Rank the next skills to study.
///
/// Mastered/perfect skills are excluded. Skills currently being learned
/// come first with a canned "continue" rationale; the rest qualify only
/// when every prerequisite is mastered (or there are none) and score
/// importance weight + category weight. Ties break by catalog order
/// (stable sort).
pub fn recommend_next(
    catalog: &SkillCatalog,
    model: &StudentModel,
    count: usize,
) -> Vec<Recommendation> {
    let mut scored: Vec<(&SkillDefinition, u32, String)> = Vec::new();

    for skill in catalog.skills() {
        let status = model
            .skills
            .get(&skill.id)
            .map(|e| e.status)
            .unwrap_or(SkillStatus::Locked);

        if status.is_mastered() {
            continue;
        }

        if status == SkillStatus::Learning {
            scored.push((
                skill,
                CONTINUE_SCORE,
                "Already in progress - keep going to reach mastery".to_string(),
            ));
            continue;
        }

        let qualified = skill.prerequisites.is_empty()
            || skill.prerequisites.iter().all(|p| {
                model
                    .skills
                    .get(p)
                    .map(|e| e.status.is_mastered())
                    .unwrap_or(false)
            });

        if !qualified {
            continue;
        }

        let score = skill.importance.weight() + category_weight(&skill.category);
        let reason = describe_candidate(skill);
        scored.push((skill, score, reason));
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1));

    scored
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, (skill, score, reason))| Recommendation {
            skill_id: skill.id.clone(),
            priority: i + 1,
            score,
            reason,
        })
        .collect()
}

fn describe_candidate(skill: &SkillDefinition) -> String {
    let core = skill.importance == Importance::Core;
    match (skill.prerequisites.is_empty(), core) {
        (true, true) => format!("{} is a core skill you can start right away", skill.name),
        (true, false) => format!("{} has no prerequisites - ready to start", skill.name),
        (false, true) => format!(
            "You've mastered everything {} builds on - it's a core skill worth tackling next",
            skill.name
        ),
        (false, false) => format!("Prerequisites complete - {} is ready to learn", skill.name),
    }
}

/// A resolved backtrack recommendation.
#[derive(Debug, Clone)]
pub struct BacktrackAdvice<'a> {
    /// The matched rule
    pub rule: &'a BacktrackRule,
    /// Resolved definitions for the rule's review targets, in rule order.
    /// Ids no longer in the catalog are silently dropped.
    pub skills: Vec<&'a SkillDefinition>,
}

/// Look up the backtrack rule for (skill, severity).
///
/// `None` means no rule is authored for that combination - not an error.
pub fn backtrack_advice<'a>(
    rules: &'a BacktrackRules,
    catalog: &'a SkillCatalog,
    skill_id: &str,
    severity: ErrorSeverity,
) -> Option<BacktrackAdvice<'a>> {
    let rule = rules.lookup(skill_id, severity)?;
    let skills = rule
        .backtrack_to
        .iter()
        .filter_map(|id| catalog.get(id))
        .collect();
    Some(BacktrackAdvice { rule, skills })
}

/// Build the ordered learning path to a target skill.
///
/// Post-order DFS over prerequisites: each prerequisite appears before
/// the skills that need it. Skills already mastered are skipped entirely
/// (neither listed nor recursed into), and a per-call visited set keeps
/// diamond-shaped graphs duplicate-free. Requires the validated acyclic
/// catalog.
pub fn learning_path<'a>(
    catalog: &'a SkillCatalog,
    model: &StudentModel,
    target: &str,
) -> Result<Vec<&'a SkillDefinition>> {
    if !catalog.contains(target) {
        return Err(ProgressionError::UnknownSkill(target.to_string()));
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    visit(catalog, model, target, &mut visited, &mut path);
    Ok(path)
}

fn visit<'a>(
    catalog: &'a SkillCatalog,
    model: &StudentModel,
    skill_id: &str,
    visited: &mut HashSet<String>,
    path: &mut Vec<&'a SkillDefinition>,
) {
    if !visited.insert(skill_id.to_string()) {
        return;
    }

    let Some(skill) = catalog.get(skill_id) else {
        return;
    };

    let mastered = model
        .skills
        .get(skill_id)
        .map(|e| e.status.is_mastered())
        .unwrap_or(false);
    if mastered {
        return;
    }

    for prereq in &skill.prerequisites {
        visit(catalog, model, prereq, visited, path);
    }

    path.push(skill);
}

/// Per-category progress counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryProgress {
    /// Skills in the category
    pub total: usize,
    /// Mastered (or perfect) skills in the category
    pub mastered: usize,
}

/// Global progress summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Total skills in the catalog
    pub total: usize,
    /// Mastered or perfect
    pub mastered: usize,
    /// Currently learning
    pub learning: usize,
    /// Unlocked but not started
    pub unlocked: usize,
    /// Still locked
    pub locked: usize,
    /// Percent of catalog mastered, 0-100
    pub percent_mastered: f32,
    /// Breakdown by category
    pub by_category: HashMap<String, CategoryProgress>,
}

/// Single pass over the catalog producing global and per-category counts.
pub fn progress_summary(catalog: &SkillCatalog, model: &StudentModel) -> ProgressSummary {
    let mut summary = ProgressSummary {
        total: catalog.len(),
        mastered: 0,
        learning: 0,
        unlocked: 0,
        locked: 0,
        percent_mastered: 0.0,
        by_category: HashMap::new(),
    };

    for skill in catalog.skills() {
        let status = model
            .skills
            .get(&skill.id)
            .map(|e| e.status)
            .unwrap_or(SkillStatus::Locked);

        let category = summary
            .by_category
            .entry(skill.category.clone())
            .or_default();
        category.total += 1;

        match status {
            SkillStatus::Mastered | SkillStatus::Perfect => {
                summary.mastered += 1;
                category.mastered += 1;
            }
            SkillStatus::Learning => summary.learning += 1,
            SkillStatus::Unlocked => summary.unlocked += 1,
            SkillStatus::Locked => summary.locked += 1,
        }
    }

    if summary.total > 0 {
        summary.percent_mastered = summary.mastered as f32 / summary.total as f32 * 100.0;
    }

    summary
}
