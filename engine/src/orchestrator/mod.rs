//! Agent Orchestrator
//!
//! Top-level coordinator for autonomous task processing. Receives an
//! instruction, gathers context from the configured collaborators, drives
//! the decision engine and approval gate, executes the plan step by step,
//! and feeds outcomes back into memory. Fully self-contained, no external
//! APIs.

use crate::approval::{ApprovalGate, ApprovalRequest, ChannelNotifier, LogNotifier, Notifier};
use crate::config::{Config, OperationMode};
use crate::decision::{ActionType, DecisionEngine, ExecutionPlan, ExecutionStep};
use crate::memory::store::FileStore;
use crate::memory::{MemoryStats, Pattern, VectorMemory};
use crate::plugins::PluginRegistry;
use crate::scanner::{CodeAnalysis, FileSystemScanner};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Planning,
    Executing,
    Completed,
    Failed,
}

/// A unit of work submitted by a caller
///
/// Owned by the orchestrator for its lifetime; moved from the active set
/// into the immutable history list on completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub instruction: String,
    pub context: Option<serde_json::Map<String, Value>>,
    pub source: String,
    pub status: TaskStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Record of one attempted step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: usize,
    pub description: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary returned to the caller for one processed task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: String,
    pub status: String,
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    pub summary: String,
    pub learned: bool,
}

/// A suggested change produced by the improve-code heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub confidence: f64,
}

/// Main coordinator for autonomous agent operations
pub struct AgentOrchestrator {
    config: Config,
    session_id: String,
    initialized: AtomicBool,

    // Core components
    memory: Option<Arc<AsyncMutex<VectorMemory>>>,
    decision_engine: Option<DecisionEngine>,
    approval_gate: Option<Arc<ApprovalGate>>,
    plugins: Option<Arc<PluginRegistry>>,
    filesystem: Option<Arc<AsyncMutex<FileSystemScanner>>>,

    // Web-mode approval event feed, handed to the host on request
    approval_events: Mutex<Option<UnboundedReceiver<ApprovalRequest>>>,

    // State
    active_tasks: Mutex<HashMap<String, Task>>,
    task_history: Mutex<Vec<Task>>,
}

impl AgentOrchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: format!("sess-{}", Uuid::new_v4()),
            initialized: AtomicBool::new(false),
            memory: None,
            decision_engine: None,
            approval_gate: None,
            plugins: None,
            filesystem: None,
            approval_events: Mutex::new(None),
            active_tasks: Mutex::new(HashMap::new()),
            task_history: Mutex::new(Vec::new()),
        }
    }

    /// Build and wire the configured components.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        info!(mode = ?self.config.agent.mode, "initializing agent");

        // 1. Memory system
        if self.config.agent.memory_enabled {
            let backend = Arc::new(FileStore::new(self.config.memory_store_path()));
            let mut memory = VectorMemory::new(backend);
            memory.initialize().await?;
            self.memory = Some(Arc::new(AsyncMutex::new(memory)));
        }

        // 2. Decision engine
        self.decision_engine = Some(DecisionEngine::new(
            self.memory.clone(),
            self.config.agent.autonomy,
        ));

        // 3. Approval gate, with a mode-specific notification channel
        let notifier: Box<dyn Notifier> = match self.config.agent.mode {
            OperationMode::Web => {
                let (notifier, rx) = ChannelNotifier::new();
                *self.events_lock() = Some(rx);
                Box::new(notifier)
            }
            mode => Box::new(LogNotifier::new(mode)),
        };
        self.approval_gate = Some(Arc::new(ApprovalGate::new(
            self.config.agent.autonomy,
            Duration::from_millis(self.config.agent.approval_timeout_ms),
            notifier,
        )));

        // 4. Plugin registry
        if self.config.agent.plugins_enabled {
            let plugins = PluginRegistry::new();
            plugins.load_plugins()?;
            self.plugins = Some(Arc::new(plugins));
        }

        // 5. File system scanner
        if let Some(workspace) = self.config.core.workspace.clone() {
            self.filesystem = Some(Arc::new(AsyncMutex::new(FileSystemScanner::new(
                workspace,
            )?)));
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!(session_id = %self.session_id, "agent initialized");
        Ok(())
    }

    /// Process one instruction to a terminal state.
    ///
    /// Step-level errors are recorded per step and do not propagate; errors
    /// raised outside the step loop mark the task failed and rethrow.
    pub async fn process_request(
        &self,
        instruction: &str,
        context: Option<serde_json::Map<String, Value>>,
        source: &str,
    ) -> Result<TaskReport, EngineError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(EngineError::NotInitialized);
        }

        let task_id = format!("task-{}", Uuid::new_v4());
        let task = Task {
            id: task_id.clone(),
            instruction: instruction.to_string(),
            context: context.clone(),
            source: source.to_string(),
            status: TaskStatus::Pending,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
        };
        self.active_lock().insert(task_id.clone(), task);

        match self.run_task(&task_id, instruction, context, source).await {
            Ok(report) => {
                let status = if report.success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                self.finish_task(&task_id, status);
                Ok(report)
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "task failed outside step loop");
                self.finish_task(&task_id, TaskStatus::Failed);
                Err(e)
            }
        }
    }

    async fn run_task(
        &self,
        task_id: &str,
        instruction: &str,
        context: Option<serde_json::Map<String, Value>>,
        source: &str,
    ) -> Result<TaskReport, EngineError> {
        let decision_engine = self
            .decision_engine
            .as_ref()
            .ok_or(EngineError::NotInitialized)?;
        let approval_gate = self
            .approval_gate
            .as_ref()
            .ok_or(EngineError::NotInitialized)?;

        // 1. Gather context
        self.set_task_status(task_id, TaskStatus::Planning);
        let full_context = self.gather_context(instruction, context).await;

        // 2. Create execution plan
        let mut plan = decision_engine.create_plan(instruction, &full_context).await;
        plan.task_id = task_id.to_string();
        info!(task_id = %task_id, steps = plan.steps.len(), "plan created");

        // 3. Assess risk
        let risk = decision_engine.assess_risk(&plan);
        info!(task_id = %task_id, risk = risk.level.as_str(), "risk assessed");

        // 4. Check approval if needed
        if risk.requires_approval {
            let approval = approval_gate
                .request_approval(task_id, plan.clone(), risk, source)
                .await;

            if !approval.granted {
                self.set_task_status(task_id, TaskStatus::Failed);
                let reason = approval.reason.as_deref().unwrap_or("approval denied");
                return Ok(TaskReport {
                    task_id: task_id.to_string(),
                    status: "rejected".to_string(),
                    success: false,
                    steps: vec![],
                    summary: format!("Rejected: {}", reason),
                    learned: false,
                });
            }
        }

        // 5. Execute plan
        self.set_task_status(task_id, TaskStatus::Executing);
        let (steps, success) = self.execute_plan(task_id, &plan).await;
        let summary = generate_summary(&steps);

        // 6. Learn from outcome
        let mut learned = false;
        if success {
            if let Some(memory) = &self.memory {
                memory
                    .lock()
                    .await
                    .store_outcome(task_id, instruction, &plan, &summary, success)
                    .await;
                learned = true;
            }
        }

        Ok(TaskReport {
            task_id: task_id.to_string(),
            status: if success { "completed" } else { "failed" }.to_string(),
            success,
            steps,
            summary,
            learned,
        })
    }

    /// Merge caller context with filesystem, memory, plugin, and session
    /// blocks.
    async fn gather_context(
        &self,
        instruction: &str,
        user_context: Option<serde_json::Map<String, Value>>,
    ) -> serde_json::Map<String, Value> {
        let mut context = user_context.unwrap_or_default();

        if let Some(filesystem) = &self.filesystem {
            let filesystem = filesystem.lock().await;
            context.insert(
                "filesystem".to_string(),
                json!({
                    "files": filesystem.get_file_list(),
                    "structure": filesystem.get_tree(),
                    "language": filesystem.detect_primary_language(),
                    "framework": filesystem.detect_framework(),
                }),
            );
        }

        if let Some(memory) = &self.memory {
            let mut memory = memory.lock().await;
            let similar_tasks = memory.find_similar_tasks(instruction, 3);
            context.insert(
                "memory".to_string(),
                json!({
                    "similarTasks": similar_tasks,
                    "patterns": memory.get_patterns(),
                }),
            );
        }

        if let Some(plugins) = &self.plugins {
            context.insert("plugins".to_string(), json!(plugins.list_plugins()));
        }

        context.insert(
            "website".to_string(),
            json!({
                "url": self.config.agent.website_url,
                "sessionId": self.session_id,
                "taskHistory": self.history_lock().len(),
            }),
        );

        context
    }

    /// Execute steps strictly in order. A failing critical step aborts the
    /// remainder; non-critical failures do not halt the plan.
    async fn execute_plan(
        &self,
        task_id: &str,
        plan: &ExecutionPlan,
    ) -> (Vec<StepOutcome>, bool) {
        let mut results = Vec::new();

        for step in &plan.steps {
            info!(
                task_id = %task_id,
                step = step.step_number,
                total = plan.steps.len(),
                description = %step.description,
                "executing step"
            );

            match self.execute_step(step).await {
                Ok(result) => {
                    results.push(StepOutcome {
                        step: step.step_number,
                        description: step.description.clone(),
                        success: true,
                        result: Some(result),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(task_id = %task_id, step = step.step_number, error = %e, "step failed");
                    results.push(StepOutcome {
                        step: step.step_number,
                        description: step.description.clone(),
                        success: false,
                        result: None,
                        error: Some(e.to_string()),
                    });

                    // Stop if critical step fails
                    if step.critical {
                        break;
                    }
                }
            }
        }

        let success = results.iter().all(|r| r.success);
        (results, success)
    }

    /// Dispatch one step to the corresponding collaborator.
    ///
    /// A step aimed at an unconfigured collaborator resolves to a null
    /// success; action types with no dispatch arm fail as unknown.
    async fn execute_step(&self, step: &ExecutionStep) -> Result<Value, EngineError> {
        match step.action_type {
            ActionType::AnalyzeCode => {
                let Some(filesystem) = &self.filesystem else {
                    return Ok(Value::Null);
                };
                let path = step_target(step, &["path", "target"])?;
                let analysis = filesystem.lock().await.analyze_file(path)?;
                Ok(serde_json::to_value(analysis)?)
            }

            ActionType::FileRead => {
                let Some(filesystem) = &self.filesystem else {
                    return Ok(Value::Null);
                };
                let path = step_target(step, &["path"])?;
                let content = filesystem.lock().await.read_file(path)?;
                Ok(Value::String(content))
            }

            ActionType::FileWrite => {
                let Some(filesystem) = &self.filesystem else {
                    return Ok(Value::Null);
                };
                let path = step_target(step, &["path"])?;
                let content = step
                    .params
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        EngineError::Config("file_write step requires a 'content' parameter".to_string())
                    })?;
                filesystem.lock().await.write_file(path, content);
                Ok(Value::Null)
            }

            ActionType::AnalyzePatterns => {
                let Some(memory) = &self.memory else {
                    return Ok(Value::Null);
                };
                let query = step
                    .params
                    .get("query")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let report = memory.lock().await.analyze_patterns(query);
                Ok(serde_json::to_value(report)?)
            }

            ActionType::PluginExecute => {
                let Some(plugins) = &self.plugins else {
                    return Ok(Value::Null);
                };
                let name = step_target(step, &["name"])?;
                let args = step
                    .params
                    .get("args")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                plugins.execute_plugin(name, args).await
            }

            ActionType::ImproveCode => self.improve_code(&step.params).await,

            ActionType::GenerateComponent => self.generate_component(&step.params).await,

            // No dispatch arm exists for these; they fail like any other
            // unrecognized action type
            ActionType::FileDelete | ActionType::DeployChanges | ActionType::SendMessage => {
                Err(EngineError::UnknownAction(step.action_type.as_str().to_string()))
            }
        }
    }

    /// Read the target file, re-analyze it, and suggest improvements from
    /// the analysis and the learned best-practice patterns.
    async fn improve_code(
        &self,
        params: &serde_json::Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let Some(filesystem) = &self.filesystem else {
            return Err(EngineError::Config("Filesystem not available".to_string()));
        };

        let path = params
            .get("path")
            .or_else(|| params.get("target"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                EngineError::Config("improve_code step requires a target".to_string())
            })?;

        let (code, analysis) = {
            let mut filesystem = filesystem.lock().await;
            let code = filesystem.read_file(path)?;
            let analysis = filesystem.analyze_file(path)?;
            (code, analysis)
        };

        let patterns = match &self.memory {
            Some(memory) => memory.lock().await.get_patterns(),
            None => Vec::new(),
        };

        let improvements = generate_improvements(&code, &analysis, &patterns);
        Ok(serde_json::to_value(improvements)?)
    }

    /// Generate a component from the most successful learned template, or
    /// fall back to the default skeleton.
    async fn generate_component(
        &self,
        params: &serde_json::Map<String, Value>,
    ) -> Result<Value, EngineError> {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Component");
        let props = params
            .get("props")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let patterns = match &self.memory {
            Some(memory) => memory.lock().await.get_component_patterns(),
            None => Vec::new(),
        };

        let component = build_component(name, &props, &patterns);
        Ok(Value::String(component))
    }

    // Public API for monitoring

    pub fn get_active_tasks(&self) -> Vec<Task> {
        self.active_lock().values().cloned().collect()
    }

    pub fn get_task_history(&self) -> Vec<Task> {
        self.history_lock().clone()
    }

    pub async fn get_memory_stats(&self) -> Option<MemoryStats> {
        match &self.memory {
            Some(memory) => Some(memory.lock().await.get_stats()),
            None => None,
        }
    }

    /// Gate handle for external approve/reject calls.
    pub fn approval_gate(&self) -> Option<Arc<ApprovalGate>> {
        self.approval_gate.clone()
    }

    /// Scanner handle, for hosts that preload files into the virtual table.
    pub fn filesystem(&self) -> Option<Arc<AsyncMutex<FileSystemScanner>>> {
        self.filesystem.clone()
    }

    /// Memory handle, for hosts that seed or inspect learned patterns.
    pub fn memory(&self) -> Option<Arc<AsyncMutex<VectorMemory>>> {
        self.memory.clone()
    }

    /// Receiver for web-mode approval notifications. Yields once; the feed
    /// belongs to whoever takes it first.
    pub fn take_approval_events(&self) -> Option<UnboundedReceiver<ApprovalRequest>> {
        self.events_lock().take()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Persist memory one final time before the host exits.
    pub async fn shutdown(&self) {
        info!("shutting down");

        if let Some(memory) = &self.memory {
            if let Err(e) = memory.lock().await.persist().await {
                warn!(error = %e, "final memory persist failed");
            }
        }

        info!("shutdown complete");
    }

    fn set_task_status(&self, task_id: &str, status: TaskStatus) {
        if let Some(task) = self.active_lock().get_mut(task_id) {
            task.status = status;
        }
    }

    /// Move a task from the active set into the immutable history list.
    fn finish_task(&self, task_id: &str, status: TaskStatus) {
        let Some(mut task) = self.active_lock().remove(task_id) else {
            return;
        };
        task.status = status;
        task.completed_at = Some(chrono::Utc::now().timestamp_millis());
        self.history_lock().push(task);
    }

    fn active_lock(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        match self.active_tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn history_lock(&self) -> MutexGuard<'_, Vec<Task>> {
        match self.task_history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn events_lock(&self) -> MutexGuard<'_, Option<UnboundedReceiver<ApprovalRequest>>> {
        match self.approval_events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn step_target<'a>(step: &'a ExecutionStep, keys: &[&str]) -> Result<&'a str, EngineError> {
    for key in keys {
        if let Some(value) = step.params.get(*key).and_then(|v| v.as_str()) {
            return Ok(value);
        }
    }
    Err(EngineError::Config(format!(
        "{} step requires a '{}' parameter",
        step.action_type.as_str(),
        keys[0]
    )))
}

/// The three-way human-readable outcome line.
fn generate_summary(results: &[StepOutcome]) -> String {
    let success_count = results.iter().filter(|r| r.success).count();
    let total_count = results.len();

    if success_count == total_count {
        format!("Successfully completed all {} steps", total_count)
    } else if success_count == 0 {
        "Failed to complete any steps".to_string()
    } else {
        format!("Completed {} of {} steps", success_count, total_count)
    }
}

fn generate_improvements(
    code: &str,
    analysis: &CodeAnalysis,
    patterns: &[Pattern],
) -> Vec<Improvement> {
    let mut improvements = Vec::new();

    if analysis.complexity > 10 {
        improvements.push(Improvement {
            kind: "complexity".to_string(),
            severity: "high".to_string(),
            suggestion: "Split into smaller functions".to_string(),
            code: None,
            confidence: 0.9,
        });
    }

    for pattern in patterns {
        if pattern.kind != "best_practice" {
            continue;
        }
        let Some(pattern_code) = &pattern.code else {
            continue;
        };
        if !code.contains(pattern_code.as_str()) {
            improvements.push(Improvement {
                kind: "pattern".to_string(),
                severity: "medium".to_string(),
                suggestion: pattern.description.clone(),
                code: Some(pattern_code.clone()),
                confidence: pattern.success_rate,
            });
        }
    }

    improvements
}

fn build_component(
    name: &str,
    props: &serde_json::Map<String, Value>,
    patterns: &[Pattern],
) -> String {
    let rendered_props: Vec<String> = props
        .iter()
        .map(|(key, ty)| format!("{}: {};", key, ty.as_str().unwrap_or("unknown")))
        .collect();

    // Prefer the most successful learned template
    let template = patterns
        .iter()
        .find(|p| p.kind == "component" && p.success_rate > 0.8)
        .and_then(|p| p.code.clone());

    if let Some(template) = template {
        return template
            .replace("ComponentName", name)
            .replace("/* props */", &rendered_props.join("\n  "));
    }

    // Default template
    let body = [
        "import React from 'react';",
        "",
        "export interface {name}Props {",
        "  {props}",
        "}",
        "",
        "export const {name}: React.FC<{name}Props> = (props) => {",
        "  return (",
        "    <div className=\"{class}\">",
        "      {/* Component content */}",
        "    </div>",
        "  );",
        "};",
    ]
    .join("\n");

    body.replace("{name}", name)
        .replace("{props}", &rendered_props.join("\n  "))
        .replace("{class}", &name.to_lowercase())
}
