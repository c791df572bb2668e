//! Phase definitions and the linear phase chain.
//!
//! The chain follows a linear progression, by default:
//! ui-ux → development → testing → completion

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{WorkflowError, WorkflowResult};
use super::state::CompletionMap;

/// Unique phase slug (e.g. `ui-ux`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(String);

impl PhaseId {
    /// Create a phase id from a slug.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the slug.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for PhaseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PhaseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PhaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Phase type, selecting which completion criteria apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKind {
    /// Design deliverables review
    UiUx,
    /// Implementation tasks and checklist
    Development,
    /// QA readiness record
    Testing,
    /// Final summary, no criteria of its own
    Completion,
}

impl PhaseKind {
    /// Get the slug for this kind.
    #[must_use]
    pub const fn slug(&self) -> &'static str {
        match self {
            Self::UiUx => "ui-ux",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Completion => "completion",
        }
    }

    /// Get the display name for this kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UiUx => "UI/UX Design",
            Self::Development => "Development",
            Self::Testing => "Testing",
            Self::Completion => "Completion",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.slug())
    }
}

impl FromStr for PhaseKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "ui-ux" | "uiux" | "ui/ux" => Ok(Self::UiUx),
            "development" | "dev" => Ok(Self::Development),
            "testing" | "qa" => Ok(Self::Testing),
            "completion" => Ok(Self::Completion),
            _ => Err(WorkflowError::UnknownPhase(s.to_string())),
        }
    }
}

/// Configured phase before it is linked into a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    /// Phase slug
    pub id: PhaseId,

    /// Display name
    pub label: String,

    /// Completion criteria selector
    pub kind: PhaseKind,
}

impl PhaseDefinition {
    /// Create a new definition.
    pub fn new(id: impl Into<PhaseId>, label: impl Into<String>, kind: PhaseKind) -> Self {
        Self { id: id.into(), label: label.into(), kind }
    }
}

/// A stage in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    /// Phase slug
    pub id: PhaseId,

    /// Display name
    pub label: String,

    /// 0-based position in the chain
    pub order: usize,

    /// Successor, `None` for the terminal phase
    pub next_phase_id: Option<PhaseId>,

    /// Completion criteria selector
    pub kind: PhaseKind,
}

impl Phase {
    /// Check if this is the terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.next_phase_id.is_none()
    }
}

/// The standard four-phase pipeline.
pub fn default_definitions() -> Vec<PhaseDefinition> {
    [PhaseKind::UiUx, PhaseKind::Development, PhaseKind::Testing, PhaseKind::Completion]
        .into_iter()
        .map(|kind| PhaseDefinition::new(kind.slug(), kind.label(), kind))
        .collect()
}

/// Ordered, validated chain of phases.
///
/// Invariants: non-empty, unique ids, exactly one terminal phase, no cycles,
/// and `order` equals the position reached by walking `next_phase_id` links
/// from the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChain {
    phases: Vec<Phase>,
}

impl PhaseChain {
    /// Build a chain from ordered definitions, linking each to the next.
    pub fn new(definitions: Vec<PhaseDefinition>) -> WorkflowResult<Self> {
        Self::from_linked(link(definitions))
    }

    /// Build a chain from explicitly linked phases, in any order.
    pub fn from_linked(phases: Vec<Phase>) -> WorkflowResult<Self> {
        if phases.is_empty() {
            return Err(WorkflowError::InvalidChain("no phases defined".to_string()));
        }

        let mut by_id: HashMap<&PhaseId, &Phase> = HashMap::new();
        for phase in &phases {
            validate_slug(&phase.id)?;
            if phase.label.trim().is_empty() {
                return Err(WorkflowError::InvalidChain(format!(
                    "phase '{}' has an empty label",
                    phase.id
                )));
            }
            if by_id.insert(&phase.id, phase).is_some() {
                return Err(WorkflowError::InvalidChain(format!(
                    "duplicate phase id '{}'",
                    phase.id
                )));
            }
        }

        let terminals = phases.iter().filter(|p| p.is_terminal()).count();
        if terminals != 1 {
            return Err(WorkflowError::InvalidChain(format!(
                "expected exactly one terminal phase, found {}",
                terminals
            )));
        }

        let mut referenced: HashSet<&PhaseId> = HashSet::new();
        for phase in &phases {
            if let Some(next) = &phase.next_phase_id {
                if !by_id.contains_key(next) {
                    return Err(WorkflowError::InvalidChain(format!(
                        "phase '{}' points to unknown phase '{}'",
                        phase.id, next
                    )));
                }
                if !referenced.insert(next) {
                    return Err(WorkflowError::InvalidChain(format!(
                        "phase '{}' has more than one predecessor",
                        next
                    )));
                }
            }
        }

        let heads: Vec<&Phase> = phases.iter().filter(|p| !referenced.contains(&p.id)).collect();
        let head = match heads.as_slice() {
            [head] => *head,
            _ => {
                return Err(WorkflowError::InvalidChain(
                    "phases do not form a single linear chain".to_string(),
                ))
            }
        };

        // Walk from the head; a cycle would leave phases unvisited.
        let mut ordered = Vec::with_capacity(phases.len());
        let mut cursor = Some(head);
        while let Some(phase) = cursor {
            if phase.order != ordered.len() {
                return Err(WorkflowError::InvalidChain(format!(
                    "phase '{}' has order {} but is at position {}",
                    phase.id,
                    phase.order,
                    ordered.len()
                )));
            }
            ordered.push(phase.clone());
            cursor = phase.next_phase_id.as_ref().and_then(|id| by_id.get(id).copied());
        }

        if ordered.len() != phases.len() {
            return Err(WorkflowError::InvalidChain(
                "phases do not form a single linear chain".to_string(),
            ));
        }

        Ok(Self { phases: ordered })
    }

    /// The standard four-phase chain.
    pub fn standard() -> Self {
        Self { phases: link(default_definitions()) }
    }

    /// Phases in order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Number of phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always false for a validated chain.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// The first phase.
    pub fn first(&self) -> &Phase {
        &self.phases[0]
    }

    /// The terminal phase.
    pub fn terminal(&self) -> &Phase {
        &self.phases[self.phases.len() - 1]
    }

    /// Look up a phase by id.
    pub fn get(&self, id: &PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| &p.id == id)
    }

    /// Check if the chain contains a phase.
    pub fn contains(&self, id: &PhaseId) -> bool {
        self.get(id).is_some()
    }

    /// The phase immediately before `id`.
    pub fn predecessor(&self, id: &PhaseId) -> Option<&Phase> {
        let phase = self.get(id)?;
        phase.order.checked_sub(1).map(|i| &self.phases[i])
    }

    /// The phase immediately after `id`.
    pub fn successor(&self, id: &PhaseId) -> Option<&Phase> {
        let next = self.get(id)?.next_phase_id.as_ref()?;
        self.get(next)
    }

    /// Whether `id` may be entered under `completed`.
    ///
    /// The first phase is always accessible; any other phase only when its
    /// immediate predecessor is completed. Unknown ids are never accessible.
    pub fn can_access(&self, id: &PhaseId, completed: &CompletionMap) -> bool {
        let Some(phase) = self.get(id) else {
            return false;
        };
        match phase.order.checked_sub(1) {
            None => true,
            Some(i) => completed.get(&self.phases[i].id).copied().unwrap_or(false),
        }
    }

    /// First phase not marked completed, or the terminal phase if all are.
    pub fn first_incomplete(&self, completed: &CompletionMap) -> &Phase {
        self.phases
            .iter()
            .find(|p| !completed.get(&p.id).copied().unwrap_or(false))
            .unwrap_or_else(|| self.terminal())
    }
}

fn link(definitions: Vec<PhaseDefinition>) -> Vec<Phase> {
    let next_ids: Vec<Option<PhaseId>> = definitions
        .iter()
        .skip(1)
        .map(|d| Some(d.id.clone()))
        .chain(std::iter::once(None))
        .collect();

    definitions
        .into_iter()
        .zip(next_ids)
        .enumerate()
        .map(|(order, (def, next_phase_id))| Phase {
            id: def.id,
            label: def.label,
            order,
            next_phase_id,
            kind: def.kind,
        })
        .collect()
}

fn validate_slug(id: &PhaseId) -> WorkflowResult<()> {
    let s = id.as_str();
    let valid = !s.is_empty()
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WorkflowError::InvalidChain(format!("invalid phase id '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(ids: &[&str]) -> CompletionMap {
        ids.iter().map(|id| (PhaseId::from(*id), true)).collect()
    }

    #[test]
    fn test_standard_chain_order() {
        let chain = PhaseChain::standard();
        let ids: Vec<&str> = chain.phases().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ui-ux", "development", "testing", "completion"]);
        assert_eq!(chain.first().id.as_str(), "ui-ux");
        assert!(chain.terminal().is_terminal());
        assert_eq!(chain.terminal().kind, PhaseKind::Completion);
    }

    #[test]
    fn test_links_and_order() {
        let chain = PhaseChain::standard();
        for (i, phase) in chain.phases().iter().enumerate() {
            assert_eq!(phase.order, i);
        }
        assert_eq!(
            chain.successor(&"ui-ux".into()).map(|p| p.id.as_str()),
            Some("development")
        );
        assert_eq!(
            chain.predecessor(&"testing".into()).map(|p| p.id.as_str()),
            Some("development")
        );
        assert!(chain.predecessor(&"ui-ux".into()).is_none());
        assert!(chain.successor(&"completion".into()).is_none());
    }

    #[test]
    fn test_can_access_first_phase_unconditionally() {
        let chain = PhaseChain::standard();
        assert!(chain.can_access(&"ui-ux".into(), &CompletionMap::new()));
    }

    #[test]
    fn test_can_access_requires_predecessor() {
        let chain = PhaseChain::standard();
        let done = completed(&["ui-ux"]);
        assert!(chain.can_access(&"development".into(), &done));
        assert!(!chain.can_access(&"testing".into(), &done));
        assert!(!chain.can_access(&"completion".into(), &done));
    }

    #[test]
    fn test_can_access_ignores_earlier_phases() {
        // Only the immediate predecessor matters.
        let chain = PhaseChain::standard();
        let done = completed(&["development"]);
        assert!(chain.can_access(&"testing".into(), &done));
    }

    #[test]
    fn test_can_access_unknown_phase() {
        let chain = PhaseChain::standard();
        assert!(!chain.can_access(&"deploy".into(), &completed(&["ui-ux", "development"])));
    }

    #[test]
    fn test_first_incomplete() {
        let chain = PhaseChain::standard();
        assert_eq!(chain.first_incomplete(&CompletionMap::new()).id.as_str(), "ui-ux");
        assert_eq!(chain.first_incomplete(&completed(&["ui-ux"])).id.as_str(), "development");

        let mut explicit_false = completed(&["ui-ux"]);
        explicit_false.insert("development".into(), false);
        assert_eq!(chain.first_incomplete(&explicit_false).id.as_str(), "development");

        let all = completed(&["ui-ux", "development", "testing", "completion"]);
        assert_eq!(chain.first_incomplete(&all).id.as_str(), "completion");
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = PhaseChain::new(vec![]).unwrap_err();
        assert_eq!(err.code(), "INVALID_PHASE_CHAIN");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let defs = vec![
            PhaseDefinition::new("design", "Design", PhaseKind::UiUx),
            PhaseDefinition::new("design", "Design again", PhaseKind::Development),
        ];
        let err = PhaseChain::new(defs).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_invalid_slug_rejected() {
        let defs = vec![PhaseDefinition::new("UI UX", "Design", PhaseKind::UiUx)];
        assert!(PhaseChain::new(defs).is_err());
    }

    #[test]
    fn test_empty_label_rejected() {
        let defs = vec![PhaseDefinition::new("design", "  ", PhaseKind::UiUx)];
        assert!(PhaseChain::new(defs).is_err());
    }

    #[test]
    fn test_from_linked_any_input_order() {
        let mut phases = PhaseChain::standard().phases().to_vec();
        phases.reverse();
        let chain = PhaseChain::from_linked(phases).unwrap();
        assert_eq!(chain.first().id.as_str(), "ui-ux");
    }

    #[test]
    fn test_from_linked_cycle_rejected() {
        let phases = vec![
            Phase {
                id: "a".into(),
                label: "A".into(),
                order: 0,
                next_phase_id: Some("b".into()),
                kind: PhaseKind::UiUx,
            },
            Phase {
                id: "b".into(),
                label: "B".into(),
                order: 1,
                next_phase_id: Some("a".into()),
                kind: PhaseKind::Development,
            },
        ];
        assert!(PhaseChain::from_linked(phases).is_err());
    }

    #[test]
    fn test_from_linked_two_terminals_rejected() {
        let phases = vec![
            Phase {
                id: "a".into(),
                label: "A".into(),
                order: 0,
                next_phase_id: None,
                kind: PhaseKind::UiUx,
            },
            Phase {
                id: "b".into(),
                label: "B".into(),
                order: 1,
                next_phase_id: None,
                kind: PhaseKind::Completion,
            },
        ];
        let err = PhaseChain::from_linked(phases).unwrap_err();
        assert!(err.to_string().contains("terminal"));
    }

    #[test]
    fn test_from_linked_dangling_link_rejected() {
        let phases = vec![Phase {
            id: "a".into(),
            label: "A".into(),
            order: 0,
            next_phase_id: Some("missing".into()),
            kind: PhaseKind::UiUx,
        }];
        assert!(PhaseChain::from_linked(phases).is_err());
    }

    #[test]
    fn test_from_linked_wrong_order_rejected() {
        let mut phases = PhaseChain::standard().phases().to_vec();
        phases[2].order = 7;
        assert!(PhaseChain::from_linked(phases).is_err());
    }

    #[test]
    fn test_phase_kind_parse() {
        assert_eq!("ui-ux".parse::<PhaseKind>().unwrap(), PhaseKind::UiUx);
        assert_eq!("UI_UX".parse::<PhaseKind>().unwrap(), PhaseKind::UiUx);
        assert_eq!("Development".parse::<PhaseKind>().unwrap(), PhaseKind::Development);
        assert_eq!("testing".parse::<PhaseKind>().unwrap(), PhaseKind::Testing);
        let err = "deployment".parse::<PhaseKind>().unwrap_err();
        assert_eq!(err, WorkflowError::UnknownPhase("deployment".into()));
    }

    #[test]
    fn test_phase_kind_serde() {
        let json = serde_json::to_string(&PhaseKind::UiUx).unwrap();
        assert_eq!(json, "\"ui-ux\"");
        let kind: PhaseKind = serde_json::from_str("\"testing\"").unwrap();
        assert_eq!(kind, PhaseKind::Testing);
    }
}
