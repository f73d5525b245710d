//! What-if editing over a scenario.
//!
//! Overrides are sparse: only rules whose amount differs from the stored
//! baseline are kept. Nothing touches the database until the session is saved
//! as a new scenario or over the base one.

use crate::db::{budget_repository, category_repository, forecast_repository};
use crate::error::{AppError, AppResult};
use crate::models::budget::BudgetRule;
use crate::models::forecast::ForecastRule;
use crate::models::recurrence::Cadence;
use crate::models::scenario::Scenario;
use crate::operations::forecast::{self, MonthFlow, ProjectedItem};
use crate::operations::recurrence::monthly_equivalent_cents;
use crate::operations::scenarios::copy_scenario;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Budget,
    Forecast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDelta {
    pub kind: RuleKind,
    pub rule_id: String,
    pub label: String,
    pub cadence: Cadence,
    pub baseline_cents: i64,
    pub override_cents: i64,
    pub delta_cents: i64,
    /// Effect on monthly cash: positive means more money left each month.
    pub monthly_cash_effect_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRow {
    pub month: NaiveDate,
    pub first_net_cents: i64,
    pub second_net_cents: i64,
    pub difference_cents: i64,
}

#[derive(Debug, Clone)]
pub struct WhatIf {
    scenario: Scenario,
    budget_rules: Vec<BudgetRule>,
    forecast_rules: Vec<ForecastRule>,
    budget_overrides: BTreeMap<String, i64>,
    forecast_overrides: BTreeMap<String, i64>,
}

fn check_override_amount(cents: i64) -> AppResult<()> {
    if cents <= 0 {
        return Err(AppError::validation("Override amount must be greater than zero"));
    }
    Ok(())
}

impl WhatIf {
    pub fn load(conn: &Connection, scenario: Scenario) -> AppResult<Self> {
        Ok(WhatIf {
            budget_rules: budget_repository::get_budgets_for_scenario(conn, &scenario.id)?,
            forecast_rules: forecast_repository::get_rules_for_scenario(conn, &scenario.id)?,
            scenario,
            budget_overrides: BTreeMap::new(),
            forecast_overrides: BTreeMap::new(),
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn budget_rules(&self) -> &[BudgetRule] {
        &self.budget_rules
    }

    pub fn forecast_rules(&self) -> &[ForecastRule] {
        &self.forecast_rules
    }

    pub fn has_overrides(&self) -> bool {
        !self.budget_overrides.is_empty() || !self.forecast_overrides.is_empty()
    }

    /// Setting an override back to the stored amount drops it.
    pub fn override_budget(&mut self, rule_id: &str, cents: i64) -> AppResult<()> {
        check_override_amount(cents)?;
        let rule = self
            .budget_rules
            .iter()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| AppError::not_found("Budget rule", rule_id))?;
        if rule.amount_cents == cents {
            self.budget_overrides.remove(rule_id);
        } else {
            self.budget_overrides.insert(rule_id.to_string(), cents);
        }
        Ok(())
    }

    pub fn override_forecast(&mut self, rule_id: &str, cents: i64) -> AppResult<()> {
        check_override_amount(cents)?;
        let rule = self
            .forecast_rules
            .iter()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| AppError::not_found("Forecast rule", rule_id))?;
        if rule.amount_cents == cents {
            self.forecast_overrides.remove(rule_id);
        } else {
            self.forecast_overrides.insert(rule_id.to_string(), cents);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.budget_overrides.clear();
        self.forecast_overrides.clear();
    }

    pub fn budget_amount(&self, rule: &BudgetRule) -> i64 {
        self.budget_overrides.get(&rule.id).copied().unwrap_or(rule.amount_cents)
    }

    pub fn forecast_amount(&self, rule: &ForecastRule) -> i64 {
        self.forecast_overrides.get(&rule.id).copied().unwrap_or(rule.amount_cents)
    }

    /// Every overridden rule with its baseline. `conn` is only used to name
    /// budget rules after their category.
    pub fn deltas(&self, conn: &Connection) -> AppResult<Vec<RuleDelta>> {
        let mut deltas = Vec::new();
        for rule in &self.budget_rules {
            let Some(&override_cents) = self.budget_overrides.get(&rule.id) else {
                continue;
            };
            let label = category_repository::get_category(conn, &rule.category_id)?
                .map(|c| c.name)
                .unwrap_or_else(|| rule.category_id.clone());
            let cadence = rule.recurrence.cadence();
            let delta_cents = override_cents - rule.amount_cents;
            deltas.push(RuleDelta {
                kind: RuleKind::Budget,
                rule_id: rule.id.clone(),
                label,
                cadence,
                baseline_cents: rule.amount_cents,
                override_cents,
                delta_cents,
                monthly_cash_effect_cents: -monthly_equivalent_cents(cadence, delta_cents),
            });
        }
        for rule in &self.forecast_rules {
            let Some(&override_cents) = self.forecast_overrides.get(&rule.id) else {
                continue;
            };
            let cadence = rule.recurrence.cadence();
            let delta_cents = override_cents - rule.amount_cents;
            deltas.push(RuleDelta {
                kind: RuleKind::Forecast,
                rule_id: rule.id.clone(),
                label: rule.description.clone(),
                cadence,
                baseline_cents: rule.amount_cents,
                override_cents,
                delta_cents,
                monthly_cash_effect_cents: rule.transaction_type.balance_sign()
                    * monthly_equivalent_cents(cadence, delta_cents),
            });
        }
        Ok(deltas)
    }

    /// Net change in monthly cash across all overrides. A raised budget
    /// limit or expense lowers it, a raised income raises it.
    pub fn monthly_delta_cents(&self, conn: &Connection) -> AppResult<i64> {
        Ok(self.deltas(conn)?.iter().map(|d| d.monthly_cash_effect_cents).sum())
    }

    /// Projection of the base scenario with overrides applied.
    pub fn project(&self, conn: &Connection, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<ProjectedItem>> {
        let events = forecast_repository::get_events_for_scenario(conn, &self.scenario.id)?;
        forecast::expand(&self.forecast_rules, &events, from, to, |rule| self.forecast_amount(rule))
    }

    pub fn cash_flow(&self, conn: &Connection, from: NaiveDate, to: NaiveDate, opening_cents: i64) -> AppResult<Vec<MonthFlow>> {
        let items = self.project(conn, from, to)?;
        Ok(forecast::monthly_flows(
            items.into_iter().map(|i| (i.date, i.transaction_type, i.amount_cents)),
            from,
            to,
            opening_cents,
        ))
    }

    /// Creates a scenario holding every base rule with the overrides applied.
    /// The base scenario is left as it was.
    pub fn save_as_new_scenario(&self, conn: &Connection, name: &str) -> AppResult<Scenario> {
        let scenario = copy_scenario(
            conn,
            &self.scenario,
            name,
            |rule| self.budget_amount(rule),
            |rule| self.forecast_amount(rule),
        )?;
        info!(
            base = %self.scenario.id,
            id = %scenario.id,
            overrides = self.budget_overrides.len() + self.forecast_overrides.len(),
            "what-if saved as new scenario"
        );
        Ok(scenario)
    }

    /// Writes the overrides into the base scenario and clears them. Returns
    /// the number of rules changed.
    pub fn save_over_current(&mut self, conn: &Connection) -> AppResult<usize> {
        let tx = conn.unchecked_transaction()?;
        for (id, cents) in &self.budget_overrides {
            budget_repository::update_amount(&tx, id, *cents)?;
        }
        for (id, cents) in &self.forecast_overrides {
            forecast_repository::update_rule_amount(&tx, id, *cents)?;
        }
        tx.commit()?;

        let changed = self.budget_overrides.len() + self.forecast_overrides.len();
        for rule in &mut self.budget_rules {
            if let Some(cents) = self.budget_overrides.remove(&rule.id) {
                rule.amount_cents = cents;
            }
        }
        for rule in &mut self.forecast_rules {
            if let Some(cents) = self.forecast_overrides.remove(&rule.id) {
                rule.amount_cents = cents;
            }
        }
        self.clear();
        info!(id = %self.scenario.id, changed, "what-if saved over scenario");
        Ok(changed)
    }
}

/// Monthly net of two scenarios' projections side by side.
pub fn compare_scenarios(
    conn: &Connection,
    first: &Scenario,
    second: &Scenario,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<ComparisonRow>> {
    let a = forecast::cash_flow_forecast(conn, &first.id, from, to, 0)?;
    let b = forecast::cash_flow_forecast(conn, &second.id, from, to, 0)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(a, b)| ComparisonRow {
            month: a.month,
            first_net_cents: a.net_cents,
            second_net_cents: b.net_cents,
            difference_cents: b.net_cents - a.net_cents,
        })
        .collect())
}
