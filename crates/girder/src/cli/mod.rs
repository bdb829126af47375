//! Command-line interface for girder.
//!
//! A thin caller over the engine: argument parsing with clap, lookups by
//! human-readable key, and plain-text output. Every mutating command saves
//! the store before returning.

use crate::app::App;
use crate::config;
use crate::domain::{
    NewProject, NewWorkItem, Priority, Project, StoryKind, WorkItem, WorkItemFilter, WorkItemKind,
    WorkItemStatus, WorkItemUpdate,
};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::{ColoredString, Colorize};

/// CLI-facing work item kind.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// A task.
    Task,
    /// An epic.
    Epic,
    /// A feature.
    Feature,
    /// A story.
    Story,
    /// A bug.
    Bug,
}

impl From<KindArg> for WorkItemKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Task => Self::Task,
            KindArg::Epic => Self::Epic,
            KindArg::Feature => Self::Feature,
            KindArg::Story => Self::Story,
            KindArg::Bug => Self::Bug,
        }
    }
}

/// CLI-facing status.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    /// Work has not begun.
    NotStarted,
    /// Actively being worked on.
    InProgress,
    /// Held up.
    Blocked,
    /// Waiting to be picked up.
    Ready,
    /// Finished.
    Done,
    /// Abandoned.
    Cancelled,
}

impl From<StatusArg> for WorkItemStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::NotStarted => Self::NotStarted,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Blocked => Self::Blocked,
            StatusArg::Ready => Self::Ready,
            StatusArg::Done => Self::Done,
            StatusArg::Cancelled => Self::Cancelled,
        }
    }
}

/// CLI-facing priority.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    /// Can wait.
    Low,
    /// Normal.
    Medium,
    /// Soon.
    High,
    /// Now.
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Self::Low,
            PriorityArg::Medium => Self::Medium,
            PriorityArg::High => Self::High,
            PriorityArg::Urgent => Self::Urgent,
        }
    }
}

/// CLI-facing story kind.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StoryKindArg {
    /// User-facing story.
    User,
    /// Engineering story.
    Engineering,
    /// Testing story.
    Testing,
}

impl From<StoryKindArg> for StoryKind {
    fn from(value: StoryKindArg) -> Self {
        match value {
            StoryKindArg::User => Self::User,
            StoryKindArg::Engineering => Self::Engineering,
            StoryKindArg::Testing => Self::Testing,
        }
    }
}

/// Girder - a work-item graph tracker.
#[derive(Debug, Parser)]
#[command(name = "girder", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize a girder repository in the current directory.
    Init,

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Create a work item.
    New(NewArgs),

    /// Show one work item with its relations.
    Show {
        /// Work item key (e.g. DEMO-3).
        key: String,
    },

    /// List work items.
    List(ListArgs),

    /// Update a work item.
    Update(UpdateArgs),

    /// Delete a work item (cascades its relations).
    Delete {
        /// Work item key.
        key: String,
    },

    /// Manage container/member relations.
    #[command(subcommand)]
    Member(MemberCommand),

    /// Manage dependency edges.
    #[command(subcommand)]
    Dep(DepCommand),

    /// Manage labels on a work item.
    #[command(subcommand)]
    Label(LabelCommand),

    /// Recompute rollup status/progress for a container.
    Rollup {
        /// Work item key.
        key: String,
    },

    /// Show blocked work items and what blocks them.
    Blocked,
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    /// Create a project.
    Add {
        /// Project name.
        name: String,

        /// Explicit project key (derived from the name when omitted).
        #[arg(long)]
        key: Option<String>,

        /// Description.
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List projects.
    List,
}

#[derive(Debug, Args)]
struct NewArgs {
    /// Project key the item belongs to.
    project: String,

    /// Title.
    title: String,

    /// Kind of work item.
    #[arg(long, value_enum, default_value = "task")]
    kind: KindArg,

    /// Description.
    #[arg(long, default_value = "")]
    description: String,

    /// Initial status.
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// Priority.
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,

    /// Story kind (stories only).
    #[arg(long, value_enum)]
    story_kind: Option<StoryKindArg>,

    /// Parent work item key (tasks only).
    #[arg(long)]
    parent: Option<String>,

    /// Due date (YYYY-MM-DD).
    #[arg(long)]
    due: Option<NaiveDate>,

    /// Assignee.
    #[arg(long)]
    assignee: Option<String>,

    /// Initial progress percentage.
    #[arg(long, default_value_t = 0.0)]
    progress: f64,

    /// Derive status/progress from members.
    #[arg(long)]
    rollup: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Restrict to a project key.
    #[arg(long)]
    project: Option<String>,

    /// Filter by kind.
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Filter by status.
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// Filter by priority.
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,

    /// Restrict to members of this container key.
    #[arg(long)]
    container: Option<String>,

    /// Limit number of results.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Work item key.
    key: String,

    /// New title.
    #[arg(long)]
    title: Option<String>,

    /// New description.
    #[arg(long)]
    description: Option<String>,

    /// New status.
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// New priority.
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,

    /// New progress percentage.
    #[arg(long)]
    progress: Option<f64>,

    /// New assignee.
    #[arg(long)]
    assignee: Option<String>,

    /// New story kind.
    #[arg(long, value_enum)]
    story_kind: Option<StoryKindArg>,

    /// New parent work item key.
    #[arg(long, conflicts_with = "detach_parent")]
    parent: Option<String>,

    /// Detach from the current parent.
    #[arg(long)]
    detach_parent: bool,

    /// New due date (YYYY-MM-DD).
    #[arg(long)]
    due: Option<NaiveDate>,

    /// Enable or disable rollup mode.
    #[arg(long)]
    rollup: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum MemberCommand {
    /// Add a member to a container.
    Add {
        /// Container work item key.
        container: String,

        /// Member work item key.
        member: String,

        /// Relation to hold the member under (defaults to the container's
        /// kind).
        #[arg(long, value_enum)]
        relation: Option<KindArg>,
    },

    /// Remove a member from a container.
    Remove {
        /// Container work item key.
        container: String,

        /// Member work item key.
        member: String,
    },
}

#[derive(Debug, Subcommand)]
enum DepCommand {
    /// Add a dependency: predecessor must finish before successor.
    Add {
        /// Predecessor work item key.
        predecessor: String,

        /// Successor work item key.
        successor: String,
    },

    /// Remove a dependency edge.
    Remove {
        /// Predecessor work item key.
        predecessor: String,

        /// Successor work item key.
        successor: String,
    },
}

#[derive(Debug, Subcommand)]
enum LabelCommand {
    /// Add a label.
    Add {
        /// Work item key.
        key: String,

        /// Label name.
        label: String,
    },

    /// Remove a label.
    Remove {
        /// Work item key.
        key: String,

        /// Label name.
        label: String,
    },
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;

        if let Command::Init = self.command {
            let girder_dir = config::init(&cwd).await?;
            println!("Initialized girder repository at {}", girder_dir.display());
            return Ok(());
        }

        let mut app = App::from_directory(&cwd).await?;
        match self.command {
            Command::Init => unreachable!("handled above"),
            Command::Project(command) => execute_project(&mut app, command).await?,
            Command::New(args) => execute_new(&mut app, args).await?,
            Command::Show { key } => execute_show(&app, &key).await?,
            Command::List(args) => execute_list(&app, args).await?,
            Command::Update(args) => execute_update(&mut app, args).await?,
            Command::Delete { key } => {
                let item = require_item(&app, &key).await?;
                app.storage_mut().delete(&item.id).await?;
                app.save().await?;
                println!("Deleted {key}");
            }
            Command::Member(command) => execute_member(&mut app, command).await?,
            Command::Dep(command) => execute_dep(&mut app, command).await?,
            Command::Label(command) => execute_label(&mut app, command).await?,
            Command::Rollup { key } => {
                let item = require_item(&app, &key).await?;
                let updated = app.storage_mut().recompute_rollup(&item.id).await?;
                app.save().await?;
                print_item_line(&updated);
            }
            Command::Blocked => {
                for (item, blockers) in app.storage().blocked_items().await? {
                    print_item_line(&item);
                    for blocker in blockers {
                        println!("    blocked by {} [{}]", blocker.key_id, blocker.status);
                    }
                }
            }
        }

        Ok(())
    }
}

async fn execute_project(app: &mut App, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Add {
            name,
            key,
            description,
        } => {
            let project = app
                .storage_mut()
                .create_project(NewProject {
                    key,
                    name,
                    description,
                })
                .await?;
            app.save().await?;
            println!("Created project {} ({})", project.key, project.name);
        }
        ProjectCommand::List => {
            for project in app.storage().list_projects().await? {
                println!("{:<10} {}", project.key.as_str(), project.name);
            }
        }
    }
    Ok(())
}

async fn execute_new(app: &mut App, args: NewArgs) -> Result<()> {
    let project = require_project(app, &args.project).await?;

    let parent_id = match &args.parent {
        Some(parent_key) => Some(require_item(app, parent_key).await?.id),
        None => None,
    };

    let mut new_item = NewWorkItem::new(project.id, args.kind.into(), args.title);
    new_item.description = args.description;
    if let Some(status) = args.status {
        new_item.status = status.into();
    }
    if let Some(priority) = args.priority {
        new_item.priority = priority.into();
    }
    new_item.story_kind = args.story_kind.map(Into::into);
    new_item.parent_id = parent_id;
    new_item.due_at = args.due;
    new_item.assignee = args.assignee;
    new_item.progress_pct = args.progress;
    new_item.rollup_mode = args.rollup;

    let item = app.storage_mut().create(new_item).await?;
    app.save().await?;
    println!("Created {}", item.key_id);
    Ok(())
}

async fn execute_show(app: &App, key: &str) -> Result<()> {
    let item = require_item(app, key).await?;

    println!("{} {} [{}]", item.key_id.bold(), item.title, item.kind);
    println!("  status:   {}", status_colored(item.status));
    println!("  priority: {}", item.priority);
    println!("  progress: {:.1}%", item.progress_pct);
    if let Some(story_kind) = item.story_kind {
        println!("  story:    {story_kind}");
    }
    if let Some(assignee) = &item.assignee {
        println!("  assignee: {assignee}");
    }
    if let Some(due) = item.due_at {
        let marker = if item.is_overdue() { " (overdue)" } else { "" };
        println!("  due:      {due}{marker}");
    }
    if let Some(completed) = item.completed_at {
        println!("  done at:  {completed}");
    }
    if !item.labels.is_empty() {
        println!("  labels:   {}", item.labels.join(", "));
    }

    let members = app.storage().get_members(&item.id, None).await?;
    if !members.is_empty() {
        println!("  members:");
        for member in members {
            println!("    {} {} [{}]", member.key_id, member.title, status_colored(member.status));
        }
    }

    let predecessors = app.storage().get_predecessors(&item.id).await?;
    if !predecessors.is_empty() {
        println!("  depends on:");
        for predecessor in predecessors {
            println!(
                "    {} {} [{}]",
                predecessor.key_id,
                predecessor.title,
                status_colored(predecessor.status)
            );
        }
    }

    if app.storage().is_blocked(&item.id).await? {
        println!("  {}", "BLOCKED".red().bold());
    }

    Ok(())
}

async fn execute_list(app: &App, args: ListArgs) -> Result<()> {
    let mut filter = WorkItemFilter {
        kind: args.kind.map(Into::into),
        status: args.status.map(Into::into),
        priority: args.priority.map(Into::into),
        limit: args.limit,
        ..Default::default()
    };
    if let Some(project_key) = &args.project {
        filter.project_id = Some(require_project(app, project_key).await?.id);
    }
    if let Some(container_key) = &args.container {
        filter.container_id = Some(require_item(app, container_key).await?.id);
    }

    for item in app.storage().list(&filter).await? {
        print_item_line(&item);
    }
    Ok(())
}

async fn execute_update(app: &mut App, args: UpdateArgs) -> Result<()> {
    let item = require_item(app, &args.key).await?;

    let parent_id = if args.detach_parent {
        Some(None)
    } else {
        match &args.parent {
            Some(parent_key) => Some(Some(require_item(app, parent_key).await?.id)),
            None => None,
        }
    };

    let updates = WorkItemUpdate {
        title: args.title,
        description: args.description,
        status: args.status.map(Into::into),
        priority: args.priority.map(Into::into),
        parent_id,
        story_kind: args.story_kind.map(|s| Some(s.into())),
        assignee: args.assignee.map(Some),
        due_at: args.due.map(Some),
        progress_pct: args.progress,
        rollup_mode: args.rollup,
        ..Default::default()
    };

    let updated = app.storage_mut().update(&item.id, updates).await?;
    app.save().await?;
    print_item_line(&updated);
    Ok(())
}

async fn execute_member(app: &mut App, command: MemberCommand) -> Result<()> {
    match command {
        MemberCommand::Add {
            container,
            member,
            relation,
        } => {
            let container_item = require_item(app, &container).await?;
            let member_item = require_item(app, &member).await?;
            let relation = relation.map_or(container_item.kind, Into::into);

            app.storage_mut()
                .add_membership(&container_item.id, &member_item.id, relation)
                .await?;
            app.save().await?;
            println!("{container} now contains {member} as {relation}");
        }
        MemberCommand::Remove { container, member } => {
            let container_item = require_item(app, &container).await?;
            let member_item = require_item(app, &member).await?;

            app.storage_mut()
                .remove_membership(&container_item.id, &member_item.id)
                .await?;
            app.save().await?;
            println!("Removed {member} from {container}");
        }
    }
    Ok(())
}

async fn execute_dep(app: &mut App, command: DepCommand) -> Result<()> {
    match command {
        DepCommand::Add {
            predecessor,
            successor,
        } => {
            let predecessor_item = require_item(app, &predecessor).await?;
            let successor_item = require_item(app, &successor).await?;

            app.storage_mut()
                .add_dependency(&predecessor_item.id, &successor_item.id)
                .await?;
            app.save().await?;
            println!("{successor} now depends on {predecessor}");
        }
        DepCommand::Remove {
            predecessor,
            successor,
        } => {
            let predecessor_item = require_item(app, &predecessor).await?;
            let successor_item = require_item(app, &successor).await?;

            app.storage_mut()
                .remove_dependency(&predecessor_item.id, &successor_item.id)
                .await?;
            app.save().await?;
            println!("Removed dependency {predecessor} -> {successor}");
        }
    }
    Ok(())
}

async fn execute_label(app: &mut App, command: LabelCommand) -> Result<()> {
    match command {
        LabelCommand::Add { key, label } => {
            let item = require_item(app, &key).await?;
            app.storage_mut().add_label(&item.id, &label).await?;
            app.save().await?;
            println!("Labeled {key} with {label}");
        }
        LabelCommand::Remove { key, label } => {
            let item = require_item(app, &key).await?;
            app.storage_mut().remove_label(&item.id, &label).await?;
            app.save().await?;
            println!("Removed label {label} from {key}");
        }
    }
    Ok(())
}

async fn require_project(app: &App, key: &str) -> Result<Project> {
    match app.storage().get_project_by_key(key).await? {
        Some(project) => Ok(project),
        None => bail!("no project with key {key:?}"),
    }
}

async fn require_item(app: &App, key: &str) -> Result<WorkItem> {
    match app.storage().get_by_key(key).await? {
        Some(item) => Ok(item),
        None => bail!("no work item with key {key:?}"),
    }
}

fn print_item_line(item: &WorkItem) {
    println!(
        "{:<10} [{:<7}] [{}] {}",
        item.key_id,
        item.kind.to_string(),
        status_colored(item.status),
        item.title
    );
}

fn status_colored(status: WorkItemStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        WorkItemStatus::NotStarted => text.dimmed(),
        WorkItemStatus::InProgress => text.yellow(),
        WorkItemStatus::Blocked => text.red(),
        WorkItemStatus::Ready => text.cyan(),
        WorkItemStatus::Done => text.green(),
        WorkItemStatus::Cancelled => text.dimmed().strikethrough(),
    }
}
