//! Skill catalog assembly and validation.
//!
//! The catalog is the immutable prerequisite graph loaded once at process
//! start and passed by reference into every engine. Construction validates
//! the data so the recursive algorithms downstream never have to.

use std::collections::HashMap;

use crate::types::SkillDefinition;

/// Error types for catalog construction.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two definitions share an id
    #[error("Duplicate skill id: {0}")]
    DuplicateId(String),

    /// A prerequisite references a skill that does not exist
    #[error("Skill {skill} lists unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { skill: String, prerequisite: String },

    /// The prerequisite relation contains a cycle
    #[error("Cyclic prerequisite involving skill: {0}")]
    CyclicPrerequisite(String),

    /// Catalog data could not be parsed
    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// The validated, immutable skill catalog.
///
/// Iteration order is definition order; the recommendation engine relies
/// on it for stable tie-breaking.
pub struct SkillCatalog {
    skills: Vec<SkillDefinition>,
    index: HashMap<String, usize>,
    catalog_hash: String,
}

impl SkillCatalog {
    /// Build a catalog from definitions, validating ids, prerequisite
    /// references, and acyclicity.
    pub fn new(skills: Vec<SkillDefinition>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(skills.len());
        for (i, skill) in skills.iter().enumerate() {
            if index.insert(skill.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(skill.id.clone()));
            }
        }

        for skill in &skills {
            for prereq in &skill.prerequisites {
                if !index.contains_key(prereq) {
                    return Err(CatalogError::UnknownPrerequisite {
                        skill: skill.id.clone(),
                        prerequisite: prereq.clone(),
                    });
                }
            }
        }

        Self::check_acyclic(&skills, &index)?;

        let catalog_hash = Self::compute_hash(&skills);

        tracing::info!(
            skills = skills.len(),
            hash = %catalog_hash,
            "Skill catalog loaded"
        );

        Ok(Self {
            skills,
            index,
            catalog_hash,
        })
    }

    /// Load a catalog from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let skills: Vec<SkillDefinition> = serde_yaml::from_str(yaml)?;
        Self::new(skills)
    }

    /// Built-in starter catalog covering early arithmetic.
    ///
    /// Deployments normally load a full curriculum from YAML; this keeps
    /// the engine usable out of the box.
    pub fn builtin() -> Self {
        use crate::types::Importance;

        let skills = vec![
            SkillDefinition::new("counting", "Counting", "foundation")
                .with_importance(Importance::Core)
                .with_keywords(["numbers", "sequence"]),
            SkillDefinition::new("place-value", "Place Value", "foundation")
                .with_importance(Importance::Core)
                .with_prerequisites(["counting"]),
            SkillDefinition::new("int-add", "Integer Addition", "arithmetic")
                .with_importance(Importance::Core)
                .with_prerequisites(["counting"]),
            SkillDefinition::new("int-sub", "Integer Subtraction", "arithmetic")
                .with_importance(Importance::Core)
                .with_prerequisites(["int-add"]),
            SkillDefinition::new("int-mul", "Integer Multiplication", "arithmetic")
                .with_importance(Importance::Core)
                .with_prerequisites(["int-add"]),
            SkillDefinition::new("int-div", "Integer Division", "arithmetic")
                .with_importance(Importance::Core)
                .with_prerequisites(["int-mul"]),
            SkillDefinition::new("frac-basics", "Fraction Basics", "arithmetic")
                .with_prerequisites(["int-div", "place-value"]),
            SkillDefinition::new("frac-add", "Fraction Addition", "arithmetic")
                .with_prerequisites(["frac-basics"]),
            SkillDefinition::new("linear-eq", "Linear Equations", "algebra")
                .with_prerequisites(["int-sub", "int-div"])
                .with_importance(Importance::Advanced),
            SkillDefinition::new("basic-shapes", "Basic Shapes", "geometry")
                .with_importance(Importance::Standard),
        ];

        // Static data, covered by a test below.
        Self::new(skills).expect("builtin catalog is valid")
    }

    /// Look up a skill by id.
    pub fn get(&self, id: &str) -> Option<&SkillDefinition> {
        self.index.get(id).map(|&i| &self.skills[i])
    }

    /// Whether the catalog contains a skill.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All skills in definition order.
    pub fn skills(&self) -> &[SkillDefinition] {
        &self.skills
    }

    /// Number of skills.
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Deterministic hash of the catalog for audit logging.
    pub fn catalog_hash(&self) -> &str {
        &self.catalog_hash
    }

    /// Iterative three-color DFS over the prerequisite relation.
    ///
    /// Gray-on-gray means a back edge, i.e. a cycle.
    fn check_acyclic(
        skills: &[SkillDefinition],
        index: &HashMap<String, usize>,
    ) -> Result<(), CatalogError> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut color = vec![WHITE; skills.len()];

        for start in 0..skills.len() {
            if color[start] != WHITE {
                continue;
            }

            // Stack of (node, next-prerequisite-offset)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            color[start] = GRAY;

            while let Some(&(node, offset)) = stack.last() {
                let prereqs = &skills[node].prerequisites;
                if offset == prereqs.len() {
                    color[node] = BLACK;
                    stack.pop();
                    continue;
                }

                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let next = index[&prereqs[offset]];
                match color[next] {
                    WHITE => {
                        color[next] = GRAY;
                        stack.push((next, 0));
                    }
                    GRAY => {
                        return Err(CatalogError::CyclicPrerequisite(skills[next].id.clone()));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Compute a deterministic hash over ids and prerequisite edges.
    fn compute_hash(skills: &[SkillDefinition]) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        for skill in skills {
            hasher.update(skill.id.as_bytes());
            for prereq in &skill.prerequisites {
                hasher.update(b"<-");
                hasher.update(prereq.as_bytes());
            }
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Importance;

    fn linear_catalog() -> Vec<SkillDefinition> {
        vec![
            SkillDefinition::new("a", "A", "foundation").with_importance(Importance::Core),
            SkillDefinition::new("b", "B", "arithmetic").with_prerequisites(["a"]),
            SkillDefinition::new("c", "C", "algebra").with_prerequisites(["b"]),
        ]
    }

    #[test]
    fn test_valid_catalog() {
        let catalog = SkillCatalog::new(linear_catalog()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.get("b").is_some());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut skills = linear_catalog();
        skills.push(SkillDefinition::new("a", "A again", "foundation"));
        assert!(matches!(
            SkillCatalog::new(skills),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_unknown_prerequisite_rejected() {
        let skills = vec![SkillDefinition::new("a", "A", "foundation").with_prerequisites(["ghost"])];
        assert!(matches!(
            SkillCatalog::new(skills),
            Err(CatalogError::UnknownPrerequisite { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        // a -> b -> c -> a
        let skills = vec![
            SkillDefinition::new("a", "A", "foundation").with_prerequisites(["c"]),
            SkillDefinition::new("b", "B", "foundation").with_prerequisites(["a"]),
            SkillDefinition::new("c", "C", "foundation").with_prerequisites(["b"]),
        ];
        assert!(matches!(
            SkillCatalog::new(skills),
            Err(CatalogError::CyclicPrerequisite(_))
        ));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let skills = vec![SkillDefinition::new("a", "A", "foundation").with_prerequisites(["a"])];
        assert!(matches!(
            SkillCatalog::new(skills),
            Err(CatalogError::CyclicPrerequisite(_))
        ));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        // d requires b and c, both require a
        let skills = vec![
            SkillDefinition::new("a", "A", "foundation"),
            SkillDefinition::new("b", "B", "foundation").with_prerequisites(["a"]),
            SkillDefinition::new("c", "C", "foundation").with_prerequisites(["a"]),
            SkillDefinition::new("d", "D", "foundation").with_prerequisites(["b", "c"]),
        ];
        assert!(SkillCatalog::new(skills).is_ok());
    }

    #[test]
    fn test_builtin_catalog_validates() {
        let catalog = SkillCatalog::builtin();
        assert!(!catalog.is_empty());
        assert!(catalog.get("counting").unwrap().is_entry_point());
    }

    #[test]
    fn test_hash_deterministic() {
        let c1 = SkillCatalog::new(linear_catalog()).unwrap();
        let c2 = SkillCatalog::new(linear_catalog()).unwrap();
        assert_eq!(c1.catalog_hash(), c2.catalog_hash());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
- id: a
  name: Counting
  category: foundation
  importance: core
- id: b
  name: Addition
  category: arithmetic
  prerequisites: [a]
"#;
        let catalog = SkillCatalog::from_yaml(yaml).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("b").unwrap().prerequisites, vec!["a"]);
    }
}
