use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tasklane_shared::{TaskCreate, TaskPatch};
use tracing::{debug, info, instrument};

use crate::auth::AuthService;
use crate::chat::ChatSession;
use crate::cli::Invocation;
use crate::client::{ApiClient, Transport};
use crate::config::Config;
use crate::render::Renderer;
use crate::session::{Navigator, Route, Session, UserContext};
use crate::store::TaskStore;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "signin", "signup", "signout", "whoami", "list", "show", "add", "edit", "toggle", "delete",
        "ask", "chat", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Tells the terminal user where the session went.
#[derive(Debug, Default)]
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        match route {
            Route::SignIn => {
                eprintln!("Signed out. Run `tasklane signin <email>` to continue.");
            }
            Route::Tasks => debug!("session ready for task commands"),
        }
    }
}

/// Everything a command needs, wired around one session.
#[derive(Clone)]
pub struct App {
    pub auth: AuthService,
    pub store: TaskStore,
    pub chat: ChatSession,
    pub renderer: Renderer,
}

impl App {
    pub fn new(
        cfg: &Config,
        session: Session,
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        let client = ApiClient::new(transport, session, navigator);
        let store = TaskStore::new(client.clone(), 1, cfg.page_size()?);
        Ok(Self {
            auth: AuthService::new(client.clone()),
            chat: ChatSession::new(client, store.clone()),
            store,
            renderer: Renderer::new(cfg)?,
        })
    }

    fn require_user(&self) -> anyhow::Result<UserContext> {
        self.auth
            .current_user()
            .ok_or_else(|| anyhow!("not signed in; run `tasklane signin <email>` first"))
    }
}

#[instrument(skip(app, inv), fields(command = %inv.command))]
pub async fn dispatch(app: &App, inv: Invocation) -> anyhow::Result<()> {
    debug!(args = ?inv.command_args, "dispatching command");
    let args = inv.command_args.as_slice();

    match inv.command.as_str() {
        "signin" => cmd_signin(app, args).await,
        "signup" => cmd_signup(app, args).await,
        "signout" => cmd_signout(app),
        "whoami" => cmd_whoami(app),
        "list" => cmd_list(app, args).await,
        "show" => cmd_show(app, args).await,
        "add" => cmd_add(app, args).await,
        "edit" => cmd_edit(app, args).await,
        "toggle" => cmd_toggle(app, args).await,
        "delete" => cmd_delete(app, args).await,
        "ask" => cmd_ask(app, args).await,
        "chat" => cmd_chat(app).await,
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn credentials_from_args(args: &[String], verb: &str) -> anyhow::Result<(String, String)> {
    let email = args
        .first()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| anyhow!("{verb} requires an email address"))?
        .trim()
        .to_string();
    let password = match args.get(1) {
        Some(password) => password.clone(),
        None => read_line("Password: ")?
            .ok_or_else(|| anyhow!("{verb} requires a password"))?,
    };
    Ok((email, password))
}

#[instrument(skip(app, args))]
async fn cmd_signin(app: &App, args: &[String]) -> anyhow::Result<()> {
    let (email, password) = credentials_from_args(args, "signin")?;
    let user = app.auth.sign_in(&email, &password).await?;
    println!("Signed in as {}.", user.email.as_deref().unwrap_or(&email));
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_signup(app: &App, args: &[String]) -> anyhow::Result<()> {
    let (email, password) = credentials_from_args(args, "signup")?;
    let user = app.auth.sign_up(&email, &password).await?;
    println!(
        "Account created; signed in as {}.",
        user.email.as_deref().unwrap_or(&email)
    );
    Ok(())
}

fn cmd_signout(app: &App) -> anyhow::Result<()> {
    app.auth.sign_out();
    Ok(())
}

fn cmd_whoami(app: &App) -> anyhow::Result<()> {
    match app.auth.current_user() {
        Some(user) => println!("{} ({})", user.email.as_deref().unwrap_or("-"), user.id),
        None => println!("Not signed in."),
    }
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_list(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let page = match args.first() {
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|page| *page >= 1)
            .ok_or_else(|| anyhow!("page must be a positive number, got: {raw}"))?,
        None => app.store.pagination().current_page,
    };

    app.store.go_to_page(page).await;
    let snapshot = app.store.snapshot();
    if let Some(error) = snapshot.error {
        return Err(anyhow!(error));
    }

    app.renderer
        .print_task_table(io::stdout().lock(), &snapshot.tasks, &snapshot.pagination)
}

#[instrument(skip(app, args))]
async fn cmd_show(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let task_id = required_id(args, "show")?;
    let task = app.store.get(task_id).await?;
    app.renderer.print_task_info(io::stdout().lock(), &task)
}

/// Splits `add` arguments at `--` into title and description.
fn parse_add_args(args: &[String]) -> anyhow::Result<TaskCreate> {
    let split = args.iter().position(|a| a == "--").unwrap_or(args.len());
    let title = args[..split].join(" ").trim().to_string();
    if title.is_empty() {
        return Err(anyhow!("add requires a title"));
    }
    let description = args
        .get(split + 1..)
        .map(|rest| rest.join(" ").trim().to_string())
        .unwrap_or_default();
    Ok(TaskCreate { title, description })
}

#[instrument(skip(app, args))]
async fn cmd_add(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let create = parse_add_args(args)?;
    let task = app.store.create(create).await?;
    println!("Created task {}.", task.id);
    Ok(())
}

/// Reads `title:`, `desc:` and `done:` modifiers; bare words extend the previous one.
fn parse_edit_args(args: &[String]) -> anyhow::Result<TaskPatch> {
    #[derive(Clone, Copy)]
    enum Field {
        Title,
        Description,
    }

    let mut patch = TaskPatch::default();
    let mut current: Option<Field> = None;

    for arg in args {
        let (field, value) = if let Some(v) = arg.strip_prefix("title:") {
            (Some(Field::Title), v)
        } else if let Some(v) = arg
            .strip_prefix("desc:")
            .or_else(|| arg.strip_prefix("description:"))
        {
            (Some(Field::Description), v)
        } else if let Some(v) = arg.strip_prefix("done:") {
            let done = match v.to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => true,
                "no" | "n" | "false" | "0" => false,
                other => return Err(anyhow!("done: expects yes or no, got: {other}")),
            };
            patch.is_completed = Some(done);
            current = None;
            continue;
        } else {
            (None, arg.as_str())
        };

        let target = match field.or(current) {
            Some(target) => target,
            None => return Err(anyhow!("unexpected edit argument: {arg}")),
        };
        let slot = match target {
            Field::Title => &mut patch.title,
            Field::Description => &mut patch.description,
        };
        match (field, slot.as_mut()) {
            (None, Some(existing)) => {
                existing.push(' ');
                existing.push_str(value);
            }
            _ => *slot = Some(value.to_string()),
        }
        current = Some(target);
    }

    if patch.is_empty() {
        return Err(anyhow!("edit requires at least one of title:, desc:, done:"));
    }
    Ok(patch)
}

#[instrument(skip(app, args))]
async fn cmd_edit(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let task_id = required_id(args, "edit")?;
    let patch = parse_edit_args(&args[1..])?;
    let task = app.store.update(task_id, patch).await?;
    println!("Updated task {} \"{}\".", task.id, task.title);
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_toggle(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let task_id = required_id(args, "toggle")?;

    app.store.refresh().await;
    let on_page = app.store.tasks().iter().any(|t| t.id == task_id);
    let task = if on_page {
        app.store.toggle_complete(task_id).await;
        if let Some(error) = app.store.error() {
            return Err(anyhow!(error));
        }
        app.store
            .tasks()
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| anyhow!("task {task_id} disappeared from the page"))?
    } else {
        debug!(task_id, "task not on current page; toggling by fetch");
        let current = app.store.get(task_id).await?;
        let patch = TaskPatch {
            is_completed: Some(!current.is_completed),
            ..TaskPatch::default()
        };
        app.store.update(task_id, patch).await?
    };

    let state = if task.is_completed { "completed" } else { "pending" };
    println!("Task {} is now {state}.", task.id);
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_delete(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let task_id = required_id(args, "delete")?;
    app.store.delete(task_id).await?;
    println!("Deleted task {task_id}.");
    Ok(())
}

#[instrument(skip(app, args))]
async fn cmd_ask(app: &App, args: &[String]) -> anyhow::Result<()> {
    app.require_user()?;
    let message = args.join(" ").trim().to_string();
    if message.is_empty() {
        return Err(anyhow!("ask requires a message"));
    }

    app.store.refresh().await;
    converse(app, &message).await
}

#[instrument(skip(app))]
async fn cmd_chat(app: &App) -> anyhow::Result<()> {
    app.require_user()?;
    app.store.refresh().await;
    eprintln!("Chat with your task assistant. /clear resets, /quit leaves.");

    while let Some(line) = read_line("> ")? {
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                app.chat.clear_messages();
                eprintln!("(transcript cleared)");
            }
            message => converse(app, message).await?,
        }
        if app.auth.current_user().is_none() {
            break;
        }
    }

    info!(turns = app.chat.messages().len(), "chat finished");
    Ok(())
}

/// Sends one message and prints whatever the assistant appended.
async fn converse(app: &App, message: &str) -> anyhow::Result<()> {
    let seen = app.chat.messages().len();
    app.chat.send(message).await;

    let snapshot = app.chat.snapshot();
    if snapshot.messages.len() == seen
        && let Some(error) = snapshot.error
    {
        return Err(anyhow!(error));
    }

    let mut out = io::stdout().lock();
    for reply in snapshot.messages.iter().skip(seen + 1) {
        app.renderer.print_chat_message(&mut out, reply)?;
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("tasklane [--rc key=value] [--rcfile PATH] [--data DIR] [--api-url URL] <command>");
    println!();
    println!("  signin <email> [password]      sign in (password read from stdin if omitted)");
    println!("  signup <email> [password]      create an account and sign in");
    println!("  signout                        forget the stored session");
    println!("  whoami                         show the signed-in user");
    println!("  list [page]                    list a page of tasks");
    println!("  show <id>                      show one task");
    println!("  add <title> [-- description]   create a task");
    println!("  edit <id> title:.. desc:.. done:yes|no");
    println!("  toggle <id>                    flip completion");
    println!("  delete <id>                    delete a task");
    println!("  ask <message>                  one message to the assistant");
    println!("  chat                           interactive assistant session");
    println!("  version                        print version");
    Ok(())
}

fn required_id<'a>(args: &'a [String], verb: &str) -> anyhow::Result<&'a str> {
    args.first()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("{verb} requires a task id"))
}

fn read_line(prompt: &str) -> anyhow::Result<Option<String>> {
    let mut err = io::stderr().lock();
    write!(err, "{prompt}")?;
    err.flush()?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("del", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("sign", &known), None);
        assert_eq!(expand_command_abbrev("signo", &known), Some("signout"));
    }

    #[test]
    fn add_splits_description_after_marker() {
        let create = parse_add_args(&strings(&["Buy", "milk", "--", "two", "litres"]))
            .expect("parse add");
        assert_eq!(create.title, "Buy milk");
        assert_eq!(create.description, "two litres");

        let bare = parse_add_args(&strings(&["Gym"])).expect("parse add");
        assert_eq!(bare.description, "");
        assert!(parse_add_args(&strings(&["--", "desc only"])).is_err());
    }

    #[test]
    fn edit_words_extend_previous_modifier() {
        let patch = parse_edit_args(&strings(&["title:Call", "the", "bank", "done:yes"]))
            .expect("parse edit");
        assert_eq!(patch.title.as_deref(), Some("Call the bank"));
        assert_eq!(patch.is_completed, Some(true));
        assert!(patch.description.is_none());

        assert!(parse_edit_args(&strings(&["loose"])).is_err());
        assert!(parse_edit_args(&[]).is_err());
    }
}
