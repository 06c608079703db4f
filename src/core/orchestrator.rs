//! Orchestrator：单轮对话状态机
//!
//! Start → Thinking → (ToolDispatch ⇄ Thinking)* → Finished | Aborted
//!
//! - Start：加载历史，前置 system prompt（上一轮 assistant 有内容时再加一条防复读提示），追加用户消息
//! - Thinking：迭代数 +1，超过预算即终止；否则把完整对话与工具目录交给适配器
//! - 无工具调用：持久化（不含前导 system 消息与本次最终回复），返回文本
//! - 有工具调用：按模型给出的顺序逐个处理，每个请求恰好对应一条 tool 消息，然后回到 Thinking
//!
//! 每轮内同一时刻只有一个模型请求或工具调用在进行；取消只在 Thinking 开始时检查。

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::cache::SessionCache;
use crate::core::error::{AgentError, CONTEXT_CLEARED_REPLY, EMPTY_REPLY};
use crate::core::state::{TurnOutcome, TurnPhase, TurnReport};
use crate::core::stats::{SessionStats, StatsSnapshot};
use crate::events::{send_event, AgentEvent, AgentState};
use crate::fallback::{FallbackPolicy, Substitution};
use crate::guard::{
    categorize, CallSignature, ErrorClassifier, GuardConfig, GuardVerdict, KeywordClassifier, LoopGuard,
};
use crate::llm::{ProviderAdapter, Usage};
use crate::memory::{Message, Role, SessionStore, ToolCallRequest};
use crate::tools::{ToolCallResult, ToolExecutor, ToolSpec};

/// 上一轮 assistant 有内容时插入的防复读提示
pub const ANTI_REPEAT_NOTICE: &str = "Do not repeat previous greetings or the same reply. \
If a similar instruction was already given earlier in this session, respond directly and proceed with tools.";

/// query 自动补全时截取的用户输入长度（字符）
const QUERY_AUTOFILL_CHARS: usize = 256;

/// 结果按 address 进入代币元数据缓存的工具
const TOKEN_METADATA_TOOL: &str = "get_token_data";

/// 编排参数（来自 [agent] 与 [guard] 配置段）
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_iterations: usize,
    pub guard: GuardConfig,
    pub balance_tool: String,
    pub balance_ttl: Duration,
    pub state_changing_tools: Vec<String>,
    pub query_autofill_tools: Vec<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            guard: cfg.guard.clone(),
            balance_tool: cfg.agent.balance_tool.clone(),
            balance_ttl: Duration::from_secs(cfg.agent.balance_ttl_secs),
            state_changing_tools: cfg.agent.state_changing_tools.clone(),
            query_autofill_tools: cfg.agent.query_autofill_tools.clone(),
        }
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }
}

/// 单轮内部状态；轮结束即丢弃
struct Turn {
    session_id: String,
    user_input: String,
    conversation: Vec<Message>,
    /// 前导 system 消息数（system prompt + 可选防复读提示），不持久化
    preamble_len: usize,
    catalog: Vec<ToolSpec>,
    guard: LoopGuard,
    iteration: usize,
    usage: Usage,
    phase: TurnPhase,
    /// 本批工具消息之后追加的 system 提示
    pending_guidance: Vec<String>,
}

/// 对话编排器：持有适配器、工具执行器、会话存储与策略
pub struct Orchestrator {
    adapter: Arc<dyn ProviderAdapter>,
    executor: ToolExecutor,
    store: Arc<dyn SessionStore>,
    system_prompt: String,
    settings: OrchestratorSettings,
    fallback: FallbackPolicy,
    classifier: Arc<dyn ErrorClassifier>,
    events: Option<UnboundedSender<AgentEvent>>,
    stats: SessionStats,
    cache: Mutex<SessionCache>,
}

impl Orchestrator {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        executor: ToolExecutor,
        store: Arc<dyn SessionStore>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let settings = OrchestratorSettings::default();
        let cache = Mutex::new(SessionCache::new(settings.balance_ttl));
        Self {
            adapter,
            executor,
            store,
            system_prompt: system_prompt.into(),
            settings,
            fallback: FallbackPolicy::standard(),
            classifier: Arc::new(KeywordClassifier::default()),
            events: None,
            stats: SessionStats::new(),
            cache,
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.cache = Mutex::new(SessionCache::new(settings.balance_ttl));
        self.settings = settings;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// 当前工具目录
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.executor.catalog()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 未过期的余额缓存
    pub async fn cached_balance(&self) -> Option<Value> {
        self.cache.lock().await.cached_balance().cloned()
    }

    pub async fn cached_token_metadata(&self, address: &str) -> Option<Value> {
        self.cache.lock().await.token_metadata(address).cloned()
    }

    fn emit(&self, ev: AgentEvent) {
        send_event(self.events.as_ref(), ev);
    }

    /// 跑一轮，只返回回复文本
    pub async fn run(&self, session_id: &str, user_input: &str) -> String {
        self.run_turn(session_id, user_input, &CancellationToken::new())
            .await
            .reply
    }

    /// 跑一轮；任何终止路径都返回字符串回复，诊断细节只进日志与事件
    pub async fn run_turn(&self, session_id: &str, user_input: &str, cancel: &CancellationToken) -> TurnReport {
        tracing::info!(session_id, "Starting agent turn");
        self.emit(AgentEvent::status(session_id, AgentState::Start, "Starting"));

        let mut turn = match self.start(session_id, user_input).await {
            Ok(turn) => turn,
            Err(e) => return self.abort(session_id, e, 0, Usage::default()),
        };

        let report = match self.drive(&mut turn, cancel).await {
            Ok(reply) => {
                tracing::info!(session_id, iterations = turn.iteration, "Agent turn finished");
                TurnReport {
                    reply,
                    outcome: TurnOutcome::Finished,
                    iterations: turn.iteration,
                    usage: turn.usage,
                }
            }
            Err(e) => {
                let iterations = turn.iteration.min(self.settings.max_iterations);
                self.abort(session_id, e, iterations, turn.usage)
            }
        };
        turn.phase = report.outcome.phase();
        tracing::debug!(session_id, phase = ?turn.phase, outcome = ?report.outcome, "turn ended");
        report
    }

    async fn start(&self, session_id: &str, user_input: &str) -> Result<Turn, AgentError> {
        let history = self
            .store
            .load(session_id)
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;

        let mut conversation = Vec::with_capacity(history.len() + 3);
        conversation.push(Message::system(self.system_prompt.clone()));
        let prior_reply = history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map_or(false, |m| !m.content.is_empty());
        if prior_reply {
            conversation.push(Message::system(ANTI_REPEAT_NOTICE));
        }
        let preamble_len = conversation.len();
        conversation.extend(history);
        conversation.push(Message::user(user_input));
        self.stats.set_context_length(conversation.len());

        Ok(Turn {
            session_id: session_id.to_string(),
            user_input: user_input.to_string(),
            conversation,
            preamble_len,
            catalog: self.executor.catalog(),
            guard: LoopGuard::new(self.settings.guard.clone()),
            iteration: 0,
            usage: Usage::default(),
            phase: TurnPhase::Start,
            pending_guidance: Vec::new(),
        })
    }

    async fn drive(&self, turn: &mut Turn, cancel: &CancellationToken) -> Result<String, AgentError> {
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            turn.iteration += 1;
            if turn.iteration > self.settings.max_iterations {
                return Err(AgentError::BudgetExhausted(self.settings.max_iterations));
            }
            turn.phase = TurnPhase::Thinking;
            tracing::debug!(session_id = %turn.session_id, iteration = turn.iteration, "agent iteration");
            self.emit(AgentEvent::Status {
                session_id: turn.session_id.clone(),
                state: AgentState::Thinking,
                message: "Thinking".to_string(),
                iteration: Some(turn.iteration),
                name: None,
            });

            let reply = self.adapter.send(&turn.conversation, &turn.catalog).await?;
            self.record_usage(turn, &reply.usage);

            if !reply.has_tool_calls() {
                return self.finish(turn, reply.text).await;
            }

            turn.phase = TurnPhase::ToolDispatch;
            tracing::debug!(
                phase = ?turn.phase,
                calls = reply.tool_calls.len(),
                "LLM requested tool calls"
            );
            turn.conversation
                .push(Message::assistant_with_calls(reply.text, reply.tool_calls.clone()));
            for call in reply.tool_calls {
                self.dispatch(turn, call).await;
            }
            for guidance in std::mem::take(&mut turn.pending_guidance) {
                turn.conversation.push(Message::system(guidance));
            }
        }
    }

    fn record_usage(&self, turn: &mut Turn, usage: &Usage) {
        turn.usage.add(usage);
        self.stats.record_request(usage);
        self.emit(AgentEvent::Usage {
            session_id: turn.session_id.clone(),
            usage: *usage,
            cumulative: self.stats.snapshot(),
        });
    }

    /// 最终回复：持久化除前导 system 消息与本条回复之外的全部消息
    async fn finish(&self, turn: &mut Turn, text: String) -> Result<String, AgentError> {
        turn.conversation.push(Message::assistant(text.clone()));
        let end = turn.conversation.len() - 1;
        self.store
            .save(&turn.session_id, &turn.conversation[turn.preamble_len..end])
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;
        self.stats.set_context_length(turn.conversation.len());

        self.emit(AgentEvent::status(&turn.session_id, AgentState::Finish, "Finished"));
        self.emit(AgentEvent::Message {
            session_id: turn.session_id.clone(),
            content: text.clone(),
            stats: self.stats.snapshot(),
        });

        if text.is_empty() {
            Ok(EMPTY_REPLY.to_string())
        } else {
            Ok(text)
        }
    }

    fn abort(&self, session_id: &str, err: AgentError, iterations: usize, usage: Usage) -> TurnReport {
        let outcome = match &err {
            AgentError::BudgetExhausted(max) => {
                tracing::warn!(session_id, "Agent hit max iterations ({})", max);
                TurnOutcome::BudgetExhausted
            }
            AgentError::Cancelled => {
                tracing::info!(session_id, "Agent turn cancelled");
                TurnOutcome::Cancelled
            }
            other => {
                tracing::error!(session_id, "Error in agent execution: {}", other);
                TurnOutcome::Aborted
            }
        };
        TurnReport {
            reply: err.user_message(),
            outcome,
            iterations,
            usage,
        }
    }

    /// 处理一个工具调用请求，恰好追加一条 tool 消息
    async fn dispatch(&self, turn: &mut Turn, call: ToolCallRequest) {
        let ToolCallRequest {
            id,
            tool_name,
            mut arguments,
        } = call;
        self.autofill_query(&tool_name, &mut arguments, &turn.user_input);

        let verdict = turn.guard.admit(&CallSignature::new(&tool_name, &arguments));
        if let Some(notice) = verdict.notice(&tool_name) {
            tracing::warn!(tool = %tool_name, ?verdict, "suppressing tool call");
            turn.conversation
                .push(Message::tool(&id, &tool_name, notice.to_string()));
            if let Some(corrective) = verdict.corrective_message(&tool_name) {
                turn.pending_guidance.push(corrective);
            }
            return;
        }

        tracing::info!("Calling tool: {}", tool_name);
        self.emit(AgentEvent::ToolCalled {
            session_id: turn.session_id.clone(),
            tool_call_id: id.clone(),
            name: tool_name.clone(),
            args: arguments.clone(),
        });
        self.emit(AgentEvent::Status {
            session_id: turn.session_id.clone(),
            state: AgentState::ToolCall,
            message: format!("Calling {tool_name}"),
            iteration: None,
            name: Some(tool_name.clone()),
        });

        if let Some(cached) = self.cached_result(&tool_name, &arguments).await {
            tracing::info!(tool = %tool_name, "served from session cache");
            let result = ToolCallResult::ok(cached);
            turn.conversation
                .push(Message::tool(&id, &tool_name, result.to_content()));
            self.on_success(turn, &id, &tool_name, &arguments, &result);
            return;
        }

        let result = self.executor.execute(&tool_name, arguments.clone()).await;
        if result.success {
            turn.conversation
                .push(Message::tool(&id, &tool_name, result.to_content()));
            self.update_cache(&tool_name, &arguments, &result).await;
            self.on_success(turn, &id, &tool_name, &arguments, &result);
            return;
        }

        self.emit(AgentEvent::ToolFailed {
            session_id: turn.session_id.clone(),
            tool_call_id: id.clone(),
            name: tool_name.clone(),
            args: arguments.clone(),
            error: result.payload.clone(),
        });

        if turn.guard.remediation_active() {
            if let Some(sub) = self.fallback.substitute(&tool_name, &arguments) {
                // 替代调用同样受守卫约束：重复或超限时改为返回原始失败
                let verdict = turn.guard.admit(&CallSignature::new(&sub.tool_name, &sub.arguments));
                if verdict == GuardVerdict::Allow {
                    self.substitute(turn, &id, sub).await;
                    return;
                }
                tracing::warn!(tool = %sub.tool_name, ?verdict, "substitute call blocked, surfacing original failure");
            }
        }

        turn.conversation
            .push(Message::tool(&id, &tool_name, result.to_content()));
        self.on_failure(turn, &tool_name, &result);
    }

    /// 替代调用：结果写入原请求的 tool 消息（保留原 tool_call_id，工具名为替代工具）
    async fn substitute(&self, turn: &mut Turn, id: &str, sub: Substitution) {
        tracing::warn!(
            from = %sub.source_tool,
            to = %sub.tool_name,
            "{} failed, trying {}",
            sub.source_tool,
            sub.tool_name
        );
        self.emit(AgentEvent::status(
            &turn.session_id,
            AgentState::Fallback,
            format!("{} failed, trying {}", sub.source_tool, sub.tool_name),
        ));
        let fallback_id = format!("fallback-{id}");
        self.emit(AgentEvent::ToolCalled {
            session_id: turn.session_id.clone(),
            tool_call_id: fallback_id.clone(),
            name: sub.tool_name.clone(),
            args: sub.arguments.clone(),
        });

        let result = self.executor.execute(&sub.tool_name, sub.arguments.clone()).await;
        let content = json!({
            "substituted_call": {
                "replaces": sub.source_tool,
                "tool": sub.tool_name,
                "arguments": sub.arguments,
            },
            "result": result.payload,
        });
        turn.conversation
            .push(Message::tool(id, &sub.tool_name, content.to_string()));

        if result.success {
            self.update_cache(&sub.tool_name, &sub.arguments, &result).await;
            self.on_success(turn, &fallback_id, &sub.tool_name, &sub.arguments, &result);
        } else {
            self.emit(AgentEvent::ToolFailed {
                session_id: turn.session_id.clone(),
                tool_call_id: fallback_id,
                name: sub.tool_name.clone(),
                args: sub.arguments.clone(),
                error: result.payload.clone(),
            });
            self.on_failure(turn, &sub.tool_name, &result);
        }
    }

    fn on_success(
        &self,
        turn: &mut Turn,
        id: &str,
        tool_name: &str,
        arguments: &Map<String, Value>,
        result: &ToolCallResult,
    ) {
        turn.guard.record_success(tool_name);
        self.emit(AgentEvent::ToolSucceeded {
            session_id: turn.session_id.clone(),
            tool_call_id: id.to_string(),
            name: tool_name.to_string(),
            args: arguments.clone(),
            result: result.payload.clone(),
        });
        self.emit(AgentEvent::Status {
            session_id: turn.session_id.clone(),
            state: AgentState::ToolDone,
            message: format!("{tool_name} done"),
            iteration: None,
            name: Some(tool_name.to_string()),
        });
    }

    /// 失败计数；仍可纠正时追加单次失败提示，刚达到上限时再追加一次分类提示
    fn on_failure(&self, turn: &mut Turn, tool_name: &str, result: &ToolCallResult) {
        let outcome = turn.guard.record_failure();
        let category = categorize(self.classifier.as_ref(), result);
        let message = result.error_message();
        tracing::warn!(
            tool = tool_name,
            category = category.as_str(),
            streak = outcome.streak,
            "Tool returned error: {}",
            message
        );
        if outcome.remediate {
            turn.pending_guidance
                .push(category.failure_guidance(&message, &result.missing_fields()));
        }
        if outcome.cutoff_reached {
            tracing::warn!(
                "Too many consecutive tool errors ({}), no further remediation this turn",
                outcome.streak
            );
            turn.pending_guidance.push(category.streak_guidance(&message));
        }
    }

    fn autofill_query(&self, tool_name: &str, arguments: &mut Map<String, Value>, user_input: &str) {
        if !self.settings.query_autofill_tools.iter().any(|t| t == tool_name) {
            return;
        }
        let empty = arguments
            .get("query")
            .map_or(true, |q| q.as_str().map_or(q.is_null(), |s| s.trim().is_empty()));
        if empty {
            let query: String = user_input.trim().chars().take(QUERY_AUTOFILL_CHARS).collect();
            tracing::debug!(tool = tool_name, "Filled missing 'query' from user input");
            arguments.insert("query".to_string(), Value::String(query));
        }
    }

    /// 可直接由会话缓存回答的调用：本钱包余额（不带 address）与按 address 的代币元数据
    async fn cached_result(&self, tool_name: &str, arguments: &Map<String, Value>) -> Option<Value> {
        let cache = self.cache.lock().await;
        if tool_name == self.settings.balance_tool {
            if address_arg(arguments).is_some() {
                return None;
            }
            return cache.cached_balance().cloned();
        }
        if tool_name == TOKEN_METADATA_TOOL {
            return address_arg(arguments).and_then(|a| cache.token_metadata(a).cloned());
        }
        None
    }

    async fn update_cache(&self, tool_name: &str, arguments: &Map<String, Value>, result: &ToolCallResult) {
        let mut cache = self.cache.lock().await;
        if tool_name == self.settings.balance_tool {
            // 只缓存本钱包余额，查询其它地址不进缓存
            if address_arg(arguments).is_none() {
                cache.cache_balance(result.payload.clone());
            }
        } else if self.settings.state_changing_tools.iter().any(|t| t == tool_name) {
            tracing::debug!(tool = tool_name, "invalidating balance cache");
            cache.invalidate_balance();
        }
        if tool_name == TOKEN_METADATA_TOOL {
            if let Some(address) = address_arg(arguments) {
                cache.cache_token_metadata(address, result.payload.clone());
            }
        }
    }

    /// 清空会话：删除存储、重置统计与缓存
    pub async fn clear_context(&self, session_id: &str) -> Result<String, AgentError> {
        self.store
            .clear(session_id)
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;
        self.stats.reset();
        self.cache.lock().await.reset();
        self.emit(AgentEvent::status(
            session_id,
            AgentState::ContextCleared,
            "Conversation context cleared",
        ));
        tracing::info!(session_id, "Cleared context");
        Ok(CONTEXT_CLEARED_REPLY.to_string())
    }

    /// 压缩会话：较早的消息由模型总结为一条 assistant 摘要，保留最近 keep_recent 条
    pub async fn compact_conversation(&self, session_id: &str, keep_recent: usize) -> Result<String, AgentError> {
        let history = self
            .store
            .load(session_id)
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;

        let threshold = (keep_recent + 2).max(6);
        if history.len() <= threshold {
            return Ok(format!("Conversation is already compact (≤{threshold} messages)."));
        }

        let split = history.len() - keep_recent;
        let (old, recent) = history.split_at(split);
        let prompt = format!(
            "Summarize this conversation history in 2-3 bullet points, focusing on key decisions, \
             transactions, and context that would be useful for future interactions:\n\n{}\n\n\
             Respond with just the bullet points, no preamble.",
            format_for_summary(old)
        );
        let reply = self.adapter.send(&[Message::user(prompt)], &[]).await?;

        let mut compacted = Vec::with_capacity(recent.len() + 1);
        compacted.push(Message::assistant(format!(
            "📋 **Previous conversation summary:**\n{}",
            reply.text.trim()
        )));
        compacted.extend_from_slice(recent);
        self.store
            .save(session_id, &compacted)
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;
        self.stats.set_context_length(compacted.len() + 1);

        tracing::info!(
            session_id,
            "Compacted session: {} -> summary + {} messages",
            old.len(),
            recent.len()
        );
        Ok(format!(
            "Conversation compacted! Summarized {} old messages, kept {} recent ones.",
            old.len(),
            recent.len()
        ))
    }
}

fn address_arg(arguments: &Map<String, Value>) -> Option<&str> {
    arguments
        .get("address")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
}

fn format_for_summary(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(format!("User: {}", m.content)),
            Role::Assistant => Some(format!("Assistant: {}", m.content)),
            Role::Tool => Some(format!("[{} executed]", m.tool_name.as_deref().unwrap_or("tool"))),
            Role::System => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
