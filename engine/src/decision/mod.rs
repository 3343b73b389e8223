//! Decision Engine
//!
//! Turns a free-text instruction into a structured execution plan and
//! computes a risk assessment per plan. Intent classification is keyword
//! based; each intent maps to a fixed step-generation routine. The engine
//! may consult the vector memory for similar successful past tasks.

use crate::config::AutonomyLevel;
use crate::memory::{TaskMemory, VectorMemory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Risk classification for a step or a whole plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Numeric score used for plan-level aggregation
    pub fn score(self) -> u8 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// The fixed set of step action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    FileRead,
    FileWrite,
    FileDelete,
    AnalyzeCode,
    AnalyzePatterns,
    PluginExecute,
    ImproveCode,
    GenerateComponent,
    DeployChanges,
    SendMessage,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::FileRead => "file_read",
            ActionType::FileWrite => "file_write",
            ActionType::FileDelete => "file_delete",
            ActionType::AnalyzeCode => "analyze_code",
            ActionType::AnalyzePatterns => "analyze_patterns",
            ActionType::PluginExecute => "plugin_execute",
            ActionType::ImproveCode => "improve_code",
            ActionType::GenerateComponent => "generate_component",
            ActionType::DeployChanges => "deploy_changes",
            ActionType::SendMessage => "send_message",
        }
    }
}

/// One action within a plan
///
/// Risk level and duration are assigned at plan-generation time and never
/// recomputed. A failing critical step aborts the remainder of the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub step_number: usize,
    pub action_type: ActionType,
    pub description: String,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub critical: bool,
    pub risk_level: RiskLevel,
    pub estimated_duration: u64,
}

/// An ordered plan derived from one instruction; immutable after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub task_id: String,
    pub description: String,
    pub steps: Vec<ExecutionStep>,
    pub estimated_total_time: u64,
    pub overall_risk: RiskLevel,
}

/// Plan-level risk summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub requires_approval: bool,
    pub concerns: Vec<String>,
    pub destructive_actions: Vec<String>,
    pub external_calls: Vec<String>,
}

/// Classified instruction intent
#[derive(Debug, Clone, PartialEq, Eq)]
enum Intent {
    AnalyzeWebsite,
    FixBug { description: String },
    Improve { target: String },
    Create { target: String },
    AddFeature { description: String },
    Analyze,
}

/// Rule-based planner and risk scorer
pub struct DecisionEngine {
    memory: Option<Arc<Mutex<VectorMemory>>>,
    autonomy: AutonomyLevel,
}

impl DecisionEngine {
    pub fn new(memory: Option<Arc<Mutex<VectorMemory>>>, autonomy: AutonomyLevel) -> Self {
        Self { memory, autonomy }
    }

    /// Build an execution plan for the instruction.
    ///
    /// Consults up to 3 similar successful past tasks when memory is
    /// configured. Absence of memory or filesystem context yields fewer
    /// steps, possibly zero; plan creation itself never fails.
    pub async fn create_plan(
        &self,
        instruction: &str,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> ExecutionPlan {
        let intent = parse_intent(instruction);
        debug!(?intent, "classified instruction");

        let mut similar_approaches: Vec<TaskMemory> = Vec::new();
        if let Some(memory) = &self.memory {
            let mut memory = memory.lock().await;
            similar_approaches = memory
                .find_similar_tasks(instruction, 3)
                .into_iter()
                .filter(|m| m.success)
                .collect();
        }

        let mut steps = self.generate_steps(&intent, context, &similar_approaches);

        for (idx, step) in steps.iter_mut().enumerate() {
            step.step_number = idx + 1;
        }

        let overall_risk = calculate_overall_risk(&steps);
        let estimated_total_time = steps.iter().map(|s| s.estimated_duration).sum();

        ExecutionPlan {
            task_id: String::new(),
            description: instruction.to_string(),
            steps,
            estimated_total_time,
            overall_risk,
        }
    }

    /// Scan a plan for concerns and decide whether approval is required.
    pub fn assess_risk(&self, plan: &ExecutionPlan) -> RiskAssessment {
        let mut concerns = Vec::new();
        let mut destructive_actions = Vec::new();
        let mut external_calls = Vec::new();

        for step in &plan.steps {
            match step.action_type {
                ActionType::FileDelete => {
                    destructive_actions.push(format!("Delete file: {}", param_str(step, "path")));
                    concerns.push("Irreversible file deletion".to_string());
                }
                ActionType::FileWrite => {
                    concerns.push(format!("Modify file: {}", param_str(step, "path")));
                }
                ActionType::DeployChanges => {
                    destructive_actions.push("Deploy changes to production".to_string());
                    concerns.push("Changes will be visible to users".to_string());
                }
                ActionType::SendMessage => {
                    external_calls.push(format!("Send message to: {}", param_str(step, "to")));
                    concerns.push("External communication".to_string());
                }
                _ => {}
            }
        }

        let requires_approval = match self.autonomy {
            AutonomyLevel::Interactive => true,
            AutonomyLevel::Semi => {
                !destructive_actions.is_empty() || plan.overall_risk != RiskLevel::Low
            }
            AutonomyLevel::Full => plan.overall_risk == RiskLevel::High,
        };

        RiskAssessment {
            level: plan.overall_risk,
            requires_approval,
            concerns,
            destructive_actions,
            external_calls,
        }
    }

    fn generate_steps(
        &self,
        intent: &Intent,
        context: &serde_json::Map<String, serde_json::Value>,
        similar_approaches: &[TaskMemory],
    ) -> Vec<ExecutionStep> {
        match intent {
            Intent::AnalyzeWebsite | Intent::Analyze => self.analysis_steps(context),
            Intent::Improve { target } => self.improvement_steps(target, similar_approaches),
            Intent::Create { target } => generation_steps(target),
            Intent::AddFeature { description } => feature_steps(description),
            Intent::FixBug { description } => bug_fix_steps(description),
        }
    }

    fn analysis_steps(
        &self,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<ExecutionStep> {
        let mut steps = Vec::new();

        if self.memory.is_some() {
            steps.push(make_step(
                ActionType::AnalyzePatterns,
                "Analyze learned patterns and user behavior",
                serde_json::json!({ "query": "user_interactions" }),
                false,
                RiskLevel::Low,
                5,
            ));
        }

        if context.contains_key("filesystem") {
            steps.push(make_step(
                ActionType::AnalyzeCode,
                "Analyze website codebase",
                serde_json::json!({ "path": "." }),
                false,
                RiskLevel::Low,
                10,
            ));
        }

        steps
    }

    fn improvement_steps(
        &self,
        target: &str,
        similar_approaches: &[TaskMemory],
    ) -> Vec<ExecutionStep> {
        vec![
            make_step(
                ActionType::AnalyzeCode,
                &format!("Analyze current {}", target),
                serde_json::json!({ "target": target }),
                true,
                RiskLevel::Low,
                10,
            ),
            make_step(
                ActionType::ImproveCode,
                &format!("Generate improvements for {}", target),
                serde_json::json!({
                    "target": target,
                    "useSimilarApproaches": !similar_approaches.is_empty(),
                }),
                true,
                RiskLevel::Medium,
                15,
            ),
        ]
    }
}

fn generation_steps(target: &str) -> Vec<ExecutionStep> {
    vec![make_step(
        ActionType::GenerateComponent,
        &format!("Generate {}", target),
        serde_json::json!({ "name": target }),
        true,
        RiskLevel::Medium,
        20,
    )]
}

fn feature_steps(description: &str) -> Vec<ExecutionStep> {
    vec![
        make_step(
            ActionType::AnalyzePatterns,
            "Analyze feature requirements",
            serde_json::json!({ "query": description }),
            true,
            RiskLevel::Low,
            5,
        ),
        make_step(
            ActionType::GenerateComponent,
            "Generate feature implementation",
            serde_json::json!({ "description": description }),
            true,
            RiskLevel::Medium,
            30,
        ),
    ]
}

fn bug_fix_steps(description: &str) -> Vec<ExecutionStep> {
    vec![
        make_step(
            ActionType::AnalyzeCode,
            "Analyze bug and identify root cause",
            serde_json::json!({ "query": description }),
            true,
            RiskLevel::Low,
            10,
        ),
        make_step(
            ActionType::ImproveCode,
            "Generate bug fix",
            serde_json::json!({ "bugDescription": description }),
            true,
            RiskLevel::High,
            20,
        ),
    ]
}

fn make_step(
    action_type: ActionType,
    description: &str,
    params: serde_json::Value,
    critical: bool,
    risk_level: RiskLevel,
    estimated_duration: u64,
) -> ExecutionStep {
    let params = match params {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    ExecutionStep {
        step_number: 0,
        action_type,
        description: description.to_string(),
        params,
        critical,
        risk_level,
        estimated_duration,
    }
}

/// Classify an instruction by keyword matching.
///
/// fix+bug is checked ahead of the generic improve keywords so a bug report
/// routes to the bug-fix table rather than the milder improvement table.
fn parse_intent(instruction: &str) -> Intent {
    let lower = instruction.to_lowercase();

    if lower.contains("analyze") && (lower.contains("website") || lower.contains("site")) {
        return Intent::AnalyzeWebsite;
    }

    if lower.contains("fix") && lower.contains("bug") {
        return Intent::FixBug {
            description: instruction.to_string(),
        };
    }

    if lower.contains("improve") || lower.contains("optimize") || lower.contains("fix") {
        return Intent::Improve {
            target: extract_target(instruction),
        };
    }

    if lower.contains("create") || lower.contains("generate") || lower.contains("build") {
        return Intent::Create {
            target: extract_target(instruction),
        };
    }

    if lower.contains("add") && lower.contains("feature") {
        return Intent::AddFeature {
            description: instruction.to_string(),
        };
    }

    Intent::Analyze
}

/// Take the words after the matched action keyword as the target.
///
/// Keywords are scanned in a fixed order and later matches overwrite
/// earlier ones; "unknown" when no keyword is followed by anything.
fn extract_target(instruction: &str) -> String {
    const ACTION_WORDS: [&str; 6] = ["improve", "optimize", "fix", "create", "generate", "build"];

    let words: Vec<&str> = instruction.split(' ').collect();
    let mut target_index = None;

    for action in ACTION_WORDS {
        let found = words
            .iter()
            .position(|w| w.to_lowercase().contains(action));
        if let Some(idx) = found {
            if idx < words.len() - 1 {
                target_index = Some(idx + 1);
            }
        }
    }

    match target_index {
        Some(idx) => words[idx..].join(" "),
        None => "unknown".to_string(),
    }
}

/// Average the per-step risk scores; >= 2.5 is high, >= 1.5 is medium.
/// An empty plan degenerates to low.
fn calculate_overall_risk(steps: &[ExecutionStep]) -> RiskLevel {
    if steps.is_empty() {
        return RiskLevel::Low;
    }

    let total: u32 = steps.iter().map(|s| s.risk_level.score() as u32).sum();
    let avg = total as f64 / steps.len() as f64;

    if avg >= 2.5 {
        RiskLevel::High
    } else if avg >= 1.5 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn param_str<'a>(step: &'a ExecutionStep, key: &str) -> &'a str {
    step.params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::InMemoryStore;

    fn engine(autonomy: AutonomyLevel) -> DecisionEngine {
        DecisionEngine::new(None, autonomy)
    }

    fn engine_with_memory(autonomy: AutonomyLevel) -> DecisionEngine {
        let memory = VectorMemory::new(Arc::new(InMemoryStore::new()));
        DecisionEngine::new(Some(Arc::new(Mutex::new(memory))), autonomy)
    }

    fn step_with_risk(risk: RiskLevel) -> ExecutionStep {
        make_step(
            ActionType::AnalyzeCode,
            "step",
            serde_json::json!({}),
            false,
            risk,
            5,
        )
    }

    fn plan_with_risks(risks: &[RiskLevel]) -> ExecutionPlan {
        let steps: Vec<ExecutionStep> = risks.iter().map(|r| step_with_risk(*r)).collect();
        let overall_risk = calculate_overall_risk(&steps);
        ExecutionPlan {
            task_id: String::new(),
            description: "test".to_string(),
            steps,
            estimated_total_time: 0,
            overall_risk,
        }
    }

    #[test]
    fn test_parse_intent_analyze_website() {
        assert_eq!(parse_intent("Analyze the website"), Intent::AnalyzeWebsite);
        assert_eq!(parse_intent("analyze this site please"), Intent::AnalyzeWebsite);
    }

    #[test]
    fn test_parse_intent_fix_bug_beats_improve() {
        let intent = parse_intent("fix bug in checkout flow");
        assert_eq!(
            intent,
            Intent::FixBug {
                description: "fix bug in checkout flow".to_string()
            }
        );
    }

    #[test]
    fn test_parse_intent_improve() {
        let intent = parse_intent("improve the pricing page");
        assert_eq!(
            intent,
            Intent::Improve {
                target: "the pricing page".to_string()
            }
        );

        let intent = parse_intent("optimize load times");
        assert!(matches!(intent, Intent::Improve { .. }));
    }

    #[test]
    fn test_parse_intent_create() {
        let intent = parse_intent("create a testimonial card");
        assert_eq!(
            intent,
            Intent::Create {
                target: "a testimonial card".to_string()
            }
        );
    }

    #[test]
    fn test_parse_intent_default_analyze() {
        assert_eq!(parse_intent("what is going on"), Intent::Analyze);
    }

    #[test]
    fn test_extract_target_last_keyword_wins() {
        // Keywords are scanned in list order; "create" overwrites "improve"
        assert_eq!(
            extract_target("create and improve the header"),
            "and improve the header"
        );
        assert_eq!(extract_target("improve"), "unknown");
    }

    #[tokio::test]
    async fn test_fix_bug_plan_shape() {
        let engine = engine(AutonomyLevel::Interactive);
        let plan = engine
            .create_plan("fix bug in checkout flow", &serde_json::Map::new())
            .await;

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].action_type, ActionType::AnalyzeCode);
        assert_eq!(plan.steps[0].risk_level, RiskLevel::Low);
        assert!(plan.steps[0].critical);
        assert_eq!(plan.steps[1].action_type, ActionType::ImproveCode);
        assert_eq!(plan.steps[1].risk_level, RiskLevel::High);
        assert!(plan.steps[1].critical);

        // Step numbers are 1-based and sequential
        assert_eq!(plan.steps[0].step_number, 1);
        assert_eq!(plan.steps[1].step_number, 2);

        // avg(1, 3) = 2.0 lands in the medium band
        assert_eq!(plan.overall_risk, RiskLevel::Medium);
        assert_eq!(plan.estimated_total_time, 30);

        let risk = engine.assess_risk(&plan);
        assert!(risk.requires_approval);
    }

    #[tokio::test]
    async fn test_analysis_plan_without_context_is_empty() {
        let engine = engine(AutonomyLevel::Full);
        let plan = engine
            .create_plan("analyze the website", &serde_json::Map::new())
            .await;

        assert!(plan.steps.is_empty());
        assert_eq!(plan.overall_risk, RiskLevel::Low);
        assert_eq!(plan.estimated_total_time, 0);
    }

    #[tokio::test]
    async fn test_analysis_plan_with_memory_and_filesystem() {
        let engine = engine_with_memory(AutonomyLevel::Full);
        let mut context = serde_json::Map::new();
        context.insert("filesystem".to_string(), serde_json::json!({}));

        let plan = engine.create_plan("analyze the website", &context).await;

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].action_type, ActionType::AnalyzePatterns);
        assert_eq!(plan.steps[1].action_type, ActionType::AnalyzeCode);
        assert!(!plan.steps[0].critical);
        assert!(!plan.steps[1].critical);
    }

    #[tokio::test]
    async fn test_improvement_plan_shape() {
        let engine = engine(AutonomyLevel::Semi);
        let plan = engine
            .create_plan("improve the hero section", &serde_json::Map::new())
            .await;

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].action_type, ActionType::ImproveCode);
        assert_eq!(plan.steps[1].risk_level, RiskLevel::Medium);
        assert_eq!(
            plan.steps[1].params.get("useSimilarApproaches"),
            Some(&serde_json::json!(false))
        );
        // avg(1, 2) = 1.5, exactly on the medium boundary
        assert_eq!(plan.overall_risk, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_feature_plan_shape() {
        let engine = engine(AutonomyLevel::Semi);
        let plan = engine
            .create_plan("add a newsletter feature", &serde_json::Map::new())
            .await;

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].action_type, ActionType::AnalyzePatterns);
        assert_eq!(plan.steps[1].action_type, ActionType::GenerateComponent);
        assert_eq!(plan.estimated_total_time, 35);
    }

    #[test]
    fn test_risk_aggregation_table() {
        assert_eq!(
            plan_with_risks(&[RiskLevel::Low, RiskLevel::Low, RiskLevel::Low]).overall_risk,
            RiskLevel::Low
        );
        assert_eq!(
            plan_with_risks(&[RiskLevel::Medium, RiskLevel::Medium, RiskLevel::Medium]).overall_risk,
            RiskLevel::Medium
        );
        assert_eq!(
            plan_with_risks(&[RiskLevel::High, RiskLevel::High, RiskLevel::High]).overall_risk,
            RiskLevel::High
        );
        // avg(1, 3) = 2.0 is medium
        assert_eq!(
            plan_with_risks(&[RiskLevel::Low, RiskLevel::High]).overall_risk,
            RiskLevel::Medium
        );
        // exactly 1.5 is medium
        assert_eq!(
            plan_with_risks(&[RiskLevel::Low, RiskLevel::Medium]).overall_risk,
            RiskLevel::Medium
        );
        // exactly 2.5 is high
        assert_eq!(
            plan_with_risks(&[RiskLevel::Medium, RiskLevel::High]).overall_risk,
            RiskLevel::High
        );
        // empty plan degenerates to low
        assert_eq!(plan_with_risks(&[]).overall_risk, RiskLevel::Low);
    }

    #[test]
    fn test_assess_risk_collects_concerns() {
        let mut steps = vec![
            make_step(
                ActionType::FileDelete,
                "delete",
                serde_json::json!({ "path": "old.ts" }),
                true,
                RiskLevel::High,
                5,
            ),
            make_step(
                ActionType::FileWrite,
                "write",
                serde_json::json!({ "path": "new.ts" }),
                true,
                RiskLevel::Medium,
                5,
            ),
            make_step(
                ActionType::SendMessage,
                "notify",
                serde_json::json!({ "to": "ops" }),
                false,
                RiskLevel::Medium,
                5,
            ),
            make_step(
                ActionType::DeployChanges,
                "deploy",
                serde_json::json!({}),
                true,
                RiskLevel::High,
                5,
            ),
        ];
        for (i, s) in steps.iter_mut().enumerate() {
            s.step_number = i + 1;
        }
        let overall_risk = calculate_overall_risk(&steps);
        let plan = ExecutionPlan {
            task_id: String::new(),
            description: "test".to_string(),
            steps,
            estimated_total_time: 20,
            overall_risk,
        };

        let engine = engine(AutonomyLevel::Semi);
        let risk = engine.assess_risk(&plan);

        assert_eq!(risk.destructive_actions.len(), 2);
        assert!(risk.destructive_actions[0].contains("old.ts"));
        assert_eq!(risk.external_calls, vec!["Send message to: ops"]);
        assert!(risk.concerns.contains(&"Modify file: new.ts".to_string()));
        assert!(risk.requires_approval);
    }

    #[test]
    fn test_requires_approval_matrix() {
        // Interactive: always
        let interactive = engine(AutonomyLevel::Interactive);
        let low_plan = plan_with_risks(&[RiskLevel::Low]);
        assert!(interactive.assess_risk(&low_plan).requires_approval);

        // Semi: low risk without destructive actions auto-passes
        let semi = engine(AutonomyLevel::Semi);
        assert!(!semi.assess_risk(&low_plan).requires_approval);
        let medium_plan = plan_with_risks(&[RiskLevel::Medium]);
        assert!(semi.assess_risk(&medium_plan).requires_approval);

        // Full: only high risk needs approval
        let full = engine(AutonomyLevel::Full);
        assert!(!full.assess_risk(&medium_plan).requires_approval);
        let high_plan = plan_with_risks(&[RiskLevel::High]);
        assert!(full.assess_risk(&high_plan).requires_approval);
    }

    #[test]
    fn test_action_type_wire_names() {
        assert_eq!(ActionType::FileWrite.as_str(), "file_write");
        assert_eq!(
            serde_json::to_string(&ActionType::GenerateComponent).unwrap(),
            "\"generate_component\""
        );
        let parsed: ActionType = serde_json::from_str("\"deploy_changes\"").unwrap();
        assert_eq!(parsed, ActionType::DeployChanges);
    }
}
