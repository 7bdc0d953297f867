use minijinja::{context, Environment};
use serde::Serialize;

use crate::error::AdvisorError;
use crate::prompt::Category;
use crate::reveal::Frame;
use crate::session::{Message, Role};

// `.html` names turn on minijinja's HTML auto-escaping.
const BUBBLE_TEMPLATE: &str = r#"<div class="msg-row {{ role }}"><div class="{{ role }}-msg">{{ content }}</div></div>"#;

#[derive(Debug, Serialize)]
struct ModeOption {
    slug: &'static str,
    label: &'static str,
}

/// Chat bubble and page markup.
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, AdvisorError> {
        let mut env = Environment::new();
        env.add_template("bubble.html", BUBBLE_TEMPLATE)?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        Ok(Self { env })
    }

    pub fn bubble(&self, message: &Message) -> Result<String, AdvisorError> {
        self.render_bubble(message.role, &message.content)
    }

    /// A bot bubble for a reply that is still being revealed.
    pub fn typing_bubble(&self, frame: &Frame) -> Result<String, AdvisorError> {
        self.render_bubble(Role::Bot, &frame.render())
    }

    fn render_bubble(&self, role: Role, content: &str) -> Result<String, AdvisorError> {
        let role = match role {
            Role::User => "user",
            Role::Bot => "bot",
        };
        Ok(self
            .env
            .get_template("bubble.html")?
            .render(context! { role => role, content => content })?)
    }

    /// The chat page. `needs_key` shows the password field.
    pub fn index(&self, model: &str, needs_key: bool) -> Result<String, AdvisorError> {
        let modes: Vec<ModeOption> = Category::ALL
            .iter()
            .map(|c| ModeOption {
                slug: c.slug(),
                label: c.label(),
            })
            .collect();
        Ok(self.env.get_template("index.html")?.render(context! {
            title => "Startup Advisor",
            model => model,
            needs_key => needs_key,
            modes => modes,
        })?)
    }
}
