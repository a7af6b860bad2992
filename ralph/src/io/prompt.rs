//! Prompt builder for agent dispatch.
//!
//! Built-in prompts are minijinja templates. A non-empty custom template in
//! `ralph.toml` replaces the built-in one and goes through plain placeholder
//! substitution instead.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::requirements::{TaskRequirements, build_requirements_steps};
use crate::core::sanitize::sanitize_task_description;
use crate::core::task::Task;
use crate::core::template::{TemplateVariables, apply_custom_template};
use crate::io::config::{PromptConfig, RalphConfig, WorkspacePaths};
use crate::io::task_file::{read_progress, read_task_list};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const PRD_GENERATION_TEMPLATE: &str = include_str!("prompts/prd_generation.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("task", TASK_TEMPLATE)
            .context("load built-in task template")?;
        env.add_template("prd_generation", PRD_GENERATION_TEMPLATE)
            .context("load built-in prd generation template")?;
        Ok(Self { env })
    }

    fn render_task(&self, input: &PromptInputs, task: &str, steps: &[String]) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template.render(context! {
            workspace => &input.workspace,
            task => task,
            steps => steps,
            prd_path => &input.prd_path,
            prd => input.prd.trim(),
            progress_path => &input.progress_path,
            progress => (!input.progress.trim().is_empty()).then(|| input.progress.trim()),
        })?;
        Ok(rendered)
    }

    fn render_prd_generation(&self, request: &str, workspace: &str, prd_path: &str) -> Result<String> {
        let template = self.env.get_template("prd_generation")?;
        let rendered = template.render(context! {
            workspace => workspace,
            request => request,
            prd_path => prd_path,
        })?;
        Ok(rendered)
    }
}

/// Everything needed to build the prompt for one task.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub task: Task,
    /// Full task-list contents.
    pub prd: String,
    /// Progress log contents (empty when the log does not exist yet).
    pub progress: String,
    pub workspace: String,
    pub prd_path: String,
    pub progress_path: String,
}

impl PromptInputs {
    /// Read the task list and progress log for `task`.
    pub fn load(paths: &WorkspacePaths, task: Task) -> Result<Self> {
        Ok(Self {
            task,
            prd: read_task_list(&paths.prd_path)?,
            progress: read_progress(&paths.progress_path)?,
            workspace: display(&paths.root),
            prd_path: display(&paths.prd_path),
            progress_path: display(&paths.progress_path),
        })
    }
}

/// Builds agent prompts from configuration and task state.
pub struct PromptBuilder {
    prompt: PromptConfig,
    requirements: TaskRequirements,
    engine: PromptEngine,
}

impl PromptBuilder {
    pub fn new(config: &RalphConfig) -> Result<Self> {
        Ok(Self {
            prompt: config.prompt.clone(),
            requirements: config.requirements,
            engine: PromptEngine::new()?,
        })
    }

    /// Build the instruction prompt for one task.
    pub fn build_task_prompt(&self, input: &PromptInputs) -> Result<String> {
        let task = sanitize_task_description(Some(&input.task.description));
        // Steps quote the checkbox line verbatim so the agent can find it.
        let steps = build_requirements_steps(&input.task.description, &self.requirements);

        if self.prompt.custom_template.trim().is_empty() {
            let rendered = self.engine.render_task(input, &task, &steps)?;
            debug!(task_id = %input.task.id, bytes = rendered.len(), "rendered built-in task prompt");
            return Ok(rendered);
        }

        let variables = TemplateVariables {
            task,
            prd: input.prd.clone(),
            progress: input.progress.clone(),
            requirements: steps.join("\n"),
            workspace: input.workspace.clone(),
        };
        let rendered = apply_custom_template(&self.prompt.custom_template, &variables);
        debug!(task_id = %input.task.id, bytes = rendered.len(), "rendered custom task prompt");
        Ok(rendered)
    }

    /// Build the prompt asking the agent to write a task list from `request`.
    pub fn build_prd_generation_prompt(&self, request: &str, paths: &WorkspacePaths) -> Result<String> {
        let request = sanitize_task_description(Some(request));
        let workspace = display(&paths.root);
        let prd_path = display(&paths.prd_path);

        if self.prompt.custom_prd_generation_template.trim().is_empty() {
            return self
                .engine
                .render_prd_generation(&request, &workspace, &prd_path);
        }

        let variables = TemplateVariables {
            task: request,
            prd: prd_path,
            workspace,
            ..TemplateVariables::default()
        };
        Ok(apply_custom_template(
            &self.prompt.custom_prd_generation_template,
            &variables,
        ))
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
