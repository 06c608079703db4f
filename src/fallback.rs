//! 失败替代策略
//!
//! 静态替代表：某个工具失败时，构造一次语义等价的另一工具调用，并把其结果放入对话代替原失败。
//! 替代调用自身失败时按普通失败处理，不再二次替代。默认只有一条规则：
//! pump.fun 买入失败 → Jupiter 兑换（SOL 数量转 lamports，百分比滑点转基点）。

use serde_json::{json, Map, Value};

/// Wrapped SOL mint（Jupiter 兑换的输入币种）
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
/// 1 SOL = 10^9 lamports
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
/// 未指定滑点时的默认百分比
const DEFAULT_SLIPPAGE_PCT: f64 = 5.0;
/// 滑点基点的安全范围
const MIN_SLIPPAGE_BPS: u64 = 1;
const MAX_SLIPPAGE_BPS: u64 = 1000;

/// 参数转换函数：无法转换时返回 None（此时不替代）
pub type ArgTranslator = fn(&Map<String, Value>) -> Option<Map<String, Value>>;

/// 一条替代规则
#[derive(Clone)]
pub struct FallbackRule {
    pub source: String,
    pub target: String,
    translate: ArgTranslator,
}

impl FallbackRule {
    pub fn new(source: impl Into<String>, target: impl Into<String>, translate: ArgTranslator) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            translate,
        }
    }
}

impl std::fmt::Debug for FallbackRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRule")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

/// 替代调用
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub source_tool: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// 替代表
#[derive(Debug, Clone, Default)]
pub struct FallbackPolicy {
    rules: Vec<FallbackRule>,
}

impl FallbackPolicy {
    /// 空表：从不替代
    pub fn none() -> Self {
        Self::default()
    }

    /// 默认表：pump_fun_buy → jupiter_swap
    pub fn standard() -> Self {
        Self::none().with_rule(FallbackRule::new("pump_fun_buy", "jupiter_swap", pump_buy_to_jupiter))
    }

    pub fn with_rule(mut self, rule: FallbackRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// 查找 failed_tool 的替代调用；仅对表中列出的源工具生效
    pub fn substitute(&self, failed_tool: &str, args: &Map<String, Value>) -> Option<Substitution> {
        let rule = self.rules.iter().find(|r| r.source == failed_tool)?;
        let arguments = (rule.translate)(args)?;
        Some(Substitution {
            source_tool: rule.source.clone(),
            tool_name: rule.target.clone(),
            arguments,
        })
    }
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `{mint, amount (SOL), slippage (%)}` → `{input_mint, output_mint, amount (lamports), slippage_bps}`
fn pump_buy_to_jupiter(args: &Map<String, Value>) -> Option<Map<String, Value>> {
    let output_mint = match args.get("mint")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return None,
    };
    let amount_sol = as_f64(args.get("amount")).unwrap_or(0.0);
    let amount_lamports = (amount_sol * LAMPORTS_PER_SOL).round().max(0.0) as u64;

    let slippage_pct = match as_f64(args.get("slippage")) {
        Some(pct) if pct > 0.0 => pct,
        _ => DEFAULT_SLIPPAGE_PCT,
    };
    let slippage_bps = ((slippage_pct * 100.0).round() as u64).clamp(MIN_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS);

    let mut out = Map::new();
    out.insert("input_mint".into(), json!(WSOL_MINT));
    out.insert("output_mint".into(), json!(output_mint));
    out.insert("amount".into(), json!(amount_lamports));
    out.insert("slippage_bps".into(), json!(slippage_bps));
    Some(out)
}
