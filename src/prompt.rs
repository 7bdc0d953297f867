//! Prompt templates, one per advisor mode.
//!
//! The query is interpolated verbatim. Escaping for display is the job of the
//! renderer, never of the prompt.

use std::fmt;
use std::str::FromStr;

use minijinja::{context, AutoEscape, Environment};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AdvisorError;

const STRATEGY_TEMPLATE: &str = "Act as a Y-Combinator partner. Analyze this situation decisively:\n\
'{{ query }}'\n\n\
Give 3 bullet points on what to do next. Be brutal but helpful.";

const IDEA_GEN_TEMPLATE: &str = "Generate a contrarian startup idea based on:\n\
'{{ query }}'\n\n\
Format:\n**Concept**\n**Moat** (Competition barrier)\n**First Step**";

const COMPETITION_TEMPLATE: &str = "List the top 3 competitors for:\n\
'{{ query }}'\n\n\
Then identify one 'Blue Ocean' feature they all miss.";

const DASHBOARD_TEMPLATE: &str = "{{ prompt }}\n\n\
After your answer, append exactly one fenced ```json block with these keys:\n\
\"allocation\": an object mapping budget categories to percentage shares,\n\
\"trend\": an array of exactly 4 numbers projecting the next four quarters,\n\
\"ratio\": a string with the expected LTV:CAC ratio, for example \"3.0x\".";

/// The closed set of advisor modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Strategy,
    IdeaGen,
    Competition,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Strategy, Category::IdeaGen, Category::Competition];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Strategy => "🧠 Strategy",
            Category::IdeaGen => "💡 Idea Gen",
            Category::Competition => "📊 Competition",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Category::Strategy => "strategy",
            Category::IdeaGen => "idea-gen",
            Category::Competition => "competition",
        }
    }

    fn template_name(&self) -> &'static str {
        match self {
            Category::Strategy => "strategy.txt",
            Category::IdeaGen => "idea_gen.txt",
            Category::Competition => "competition.txt",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = AdvisorError;

    /// Accepts the display label, the slug, or the bare name in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        for category in Category::ALL {
            if s == category.label() {
                return Ok(category);
            }
        }
        let normalized: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "strategy" => Ok(Category::Strategy),
            "ideagen" => Ok(Category::IdeaGen),
            "competition" => Ok(Category::Competition),
            _ => Err(AdvisorError::Configuration(format!(
                "unknown mode '{}' (expected one of: strategy, idea-gen, competition)",
                s
            ))),
        }
    }
}

/// Renders the prompt for a category and a user query.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    dashboard: bool,
}

impl PromptBuilder {
    pub fn new(dashboard: bool) -> Result<Self, AdvisorError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template(Category::Strategy.template_name(), STRATEGY_TEMPLATE)?;
        env.add_template(Category::IdeaGen.template_name(), IDEA_GEN_TEMPLATE)?;
        env.add_template(Category::Competition.template_name(), COMPETITION_TEMPLATE)?;
        env.add_template("dashboard.txt", DASHBOARD_TEMPLATE)?;
        Ok(Self { env, dashboard })
    }

    pub fn dashboard(&self) -> bool {
        self.dashboard
    }

    pub fn build(&self, category: Category, query: &str) -> Result<String, AdvisorError> {
        let prompt = self
            .env
            .get_template(category.template_name())?
            .render(context! { query => query })?;

        let prompt = if self.dashboard {
            self.env
                .get_template("dashboard.txt")?
                .render(context! { prompt => prompt })?
        } else {
            prompt
        };

        debug!(category = category.slug(), ?prompt, "Built prompt");
        Ok(prompt)
    }

    /// Like [`build`](Self::build) for a mode given as text, e.g. from a form.
    pub fn build_for(&self, mode: &str, query: &str) -> Result<String, AdvisorError> {
        let category: Category = mode.parse()?;
        self.build(category, query)
    }
}
