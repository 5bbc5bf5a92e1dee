use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use labcat::auth::{AuthProvider, GoTrueAuth, SessionHandle, SessionStore};
use labcat::catalog::{
  self, CategoryInput, Listing, PackageInput, Resource, ResourceOperations, ServiceInput,
};
use labcat::config::Config;
use labcat::remote::MemoryStore;
use labcat::{logging, Catalog, CatalogOptions, LogSink, OperationError};

#[derive(Parser, Debug)]
#[command(name = "labcat")]
#[command(about = "Manage a medical-laboratory catalog of categories, services and packages")]
#[command(version)]
struct Cli {
  /// Path to config file (default: ./labcat.yaml or $XDG_CONFIG_HOME/labcat/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Use an empty in-process store instead of the remote one
  #[arg(long, global = true)]
  memory: bool,

  /// Print results as JSON
  #[arg(long, global = true)]
  json: bool,

  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Package categories
  #[command(alias = "c")]
  Categories {
    #[command(subcommand)]
    action: CategoryAction,
  },
  /// Laboratory services
  #[command(alias = "s")]
  Services {
    #[command(subcommand)]
    action: ServiceAction,
  },
  /// Packages of included items at a fixed price
  #[command(alias = "p")]
  Packages {
    #[command(subcommand)]
    action: PackageAction,
  },
  /// Counts of every resource
  Summary,
  /// Sign in and remember the session
  Login(CredentialArgs),
  /// Register a new account
  Signup(CredentialArgs),
  /// Forget the saved session
  Logout,
  /// Show the signed-in user
  Whoami,
}

#[derive(Subcommand, Debug)]
enum CategoryAction {
  List(ListArgs),
  Create(CategoryArgs),
  Update {
    id: String,
    #[command(flatten)]
    fields: CategoryArgs,
  },
  Delete {
    id: String,
  },
}

#[derive(Subcommand, Debug)]
enum ServiceAction {
  List(ListArgs),
  Create(ServiceArgs),
  Update {
    id: String,
    #[command(flatten)]
    fields: ServiceArgs,
  },
  Delete {
    id: String,
  },
}

#[derive(Subcommand, Debug)]
enum PackageAction {
  List(ListArgs),
  Create(PackageArgs),
  Update {
    id: String,
    #[command(flatten)]
    fields: PackageArgs,
  },
  Delete {
    id: String,
  },
}

#[derive(Args, Debug)]
struct ListArgs {
  /// Only show entries matching this text
  #[arg(short, long)]
  search: Option<String>,
}

/// A resource subcommand with its fields already converted to form input.
enum Action<I> {
  List(Option<String>),
  Create(I),
  Update(String, I),
  Delete(String),
}

macro_rules! into_action {
  ($action:ident => $input:ty) => {
    impl From<$action> for Action<$input> {
      fn from(action: $action) -> Self {
        match action {
          $action::List(args) => Action::List(args.search),
          $action::Create(fields) => Action::Create(fields.into()),
          $action::Update { id, fields } => Action::Update(id, fields.into()),
          $action::Delete { id } => Action::Delete(id),
        }
      }
    }
  };
}

into_action!(CategoryAction => CategoryInput);
into_action!(ServiceAction => ServiceInput);
into_action!(PackageAction => PackageInput);

#[derive(Args, Debug)]
struct CategoryArgs {
  #[arg(short, long)]
  name: String,
}

#[derive(Args, Debug)]
struct ServiceArgs {
  #[arg(short, long)]
  name: String,
  #[arg(short, long, default_value = "")]
  description: String,
}

#[derive(Args, Debug)]
struct PackageArgs {
  #[arg(short, long)]
  name: String,
  /// Price in MXN
  #[arg(short, long)]
  price: f64,
  /// Category id
  #[arg(long)]
  category: Option<String>,
  /// Included item, repeatable
  #[arg(short, long = "item")]
  items: Vec<String>,
}

#[derive(Args, Debug)]
struct CredentialArgs {
  #[arg(short, long)]
  email: String,
  #[arg(short, long)]
  password: String,
}

impl From<CategoryArgs> for CategoryInput {
  fn from(args: CategoryArgs) -> Self {
    CategoryInput::new(args.name)
  }
}

impl From<ServiceArgs> for ServiceInput {
  fn from(args: ServiceArgs) -> Self {
    ServiceInput {
      name: args.name,
      description: args.description,
    }
  }
}

impl From<PackageArgs> for PackageInput {
  fn from(args: PackageArgs) -> Self {
    PackageInput {
      name: args.name,
      category_id: args.category,
      price: args.price,
      items: args.items,
    }
  }
}

fn main() -> Result<ExitCode> {
  color_eyre::install()?;
  let cli = Cli::parse();

  let _guard = logging::init_cli_logger(cli.verbose, logging::default_log_dir().as_deref());

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .wrap_err("failed to start async runtime")?;

  runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<ExitCode> {
  match cli.command {
    Command::Login(creds) => return login(cli.config.as_deref(), creds).await,
    Command::Signup(creds) => return signup(cli.config.as_deref(), creds).await,
    Command::Logout => return logout(cli.config.as_deref()).await,
    Command::Whoami => return whoami(),
    _ => {}
  }

  let app = if cli.memory {
    Catalog::new(
      Arc::new(MemoryStore::catalog()),
      Arc::new(LogSink),
      CatalogOptions::default(),
    )
  } else {
    let config = Config::load(cli.config.as_deref())?;
    Catalog::from_config(&config, Config::get_api_key()?, restore_session(), Arc::new(LogSink))?
  };

  let code = match cli.command {
    Command::Categories { action } => {
      resource_command(app.categories(), action.into(), cli.json, |items, term| {
        catalog::filter_by_name(items, term).into_iter().cloned().collect()
      })
      .await?
    }
    Command::Services { action } => {
      resource_command(app.services(), action.into(), cli.json, |items, term| {
        catalog::filter_services(items, term).into_iter().cloned().collect()
      })
      .await?
    }
    Command::Packages { action } => {
      resource_command(app.packages(), action.into(), cli.json, |items, term| {
        catalog::filter_packages(items, term).into_iter().cloned().collect()
      })
      .await?
    }
    Command::Summary => {
      let summary = app.summary().await;
      if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
      } else {
        println!("Categorías: {}", summary.categories);
        println!("Servicios:  {}", summary.services);
        println!(
          "Paquetes:   {} ({} sin categoría)",
          summary.packages, summary.uncategorized_packages
        );
      }
      ExitCode::SUCCESS
    }
    Command::Login(_) | Command::Signup(_) | Command::Logout | Command::Whoami => {
      ExitCode::SUCCESS
    }
  };

  app.shutdown();
  Ok(code)
}

// ============================================================================
// Resource commands
// ============================================================================

/// One line of human-readable output per entity.
trait Line {
  fn line(&self) -> String;
}

impl Line for catalog::Category {
  fn line(&self) -> String {
    format!("{}  {}", self.id, self.name)
  }
}

impl Line for catalog::Service {
  fn line(&self) -> String {
    match &self.description {
      Some(description) => format!("{}  {}  ({})", self.id, self.name, description),
      None => format!("{}  {}", self.id, self.name),
    }
  }
}

impl Line for catalog::Package {
  fn line(&self) -> String {
    let mut line = format!(
      "{}  {}  {}  [{}]",
      self.id,
      self.name,
      catalog::format_price(self.price),
      self.category_name().unwrap_or("sin categoría")
    );
    if !self.items.is_empty() {
      line.push_str(&format!("  incluye: {}", self.items.join(", ")));
    }
    line
  }
}

fn print_entities<T: Serialize + Line>(items: &[T], json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(items)?);
  } else {
    for item in items {
      println!("{}", item.line());
    }
  }
  Ok(())
}

/// Failures were already reported through the notification sink.
fn failed(err: &OperationError) -> ExitCode {
  tracing::debug!(error = ?err, "operation failed");
  ExitCode::FAILURE
}

async fn resource_command<R, F>(
  ops: &ResourceOperations<R>,
  action: Action<R::Input>,
  json: bool,
  filter: F,
) -> Result<ExitCode>
where
  R: Resource,
  R::Entity: Serialize + Line,
  F: Fn(&[R::Entity], &str) -> Vec<R::Entity>,
{
  match action {
    Action::List(search) => {
      let listing: Listing<R::Entity> = ops.list_settled().await;
      if let Some(err) = listing.status.error() {
        return Err(eyre!("failed to list {}: {}", R::TABLE, err));
      }
      let items = match search {
        Some(term) => filter(listing.items(), &term),
        None => listing.items().to_vec(),
      };
      print_entities(&items, json)?;
      Ok(ExitCode::SUCCESS)
    }
    Action::Create(input) => match ops.create(&input).await {
      Ok(entity) => {
        print_entities(std::slice::from_ref(&entity), json)?;
        Ok(ExitCode::SUCCESS)
      }
      Err(err) => Ok(failed(&err)),
    },
    Action::Update(id, input) => match ops.update(&id, &input).await {
      Ok(entity) => {
        print_entities(std::slice::from_ref(&entity), json)?;
        Ok(ExitCode::SUCCESS)
      }
      Err(err) => Ok(failed(&err)),
    },
    Action::Delete(id) => match ops.delete(&id).await {
      Ok(()) => Ok(ExitCode::SUCCESS),
      Err(err) => Ok(failed(&err)),
    },
  }
}

// ============================================================================
// Session commands
// ============================================================================

fn session_store() -> Result<SessionStore> {
  SessionStore::default_path()
    .map(SessionStore::new)
    .ok_or_else(|| eyre!("could not determine a data directory for the session file"))
}

fn auth_client(config_path: Option<&std::path::Path>, session: SessionHandle) -> Result<GoTrueAuth> {
  let config = Config::load(config_path)?;
  let auth = GoTrueAuth::new(&config.remote, Config::get_api_key()?, session)?;
  Ok(auth.with_store(session_store()?))
}

/// Session handle seeded from the saved session, if one is still valid.
fn restore_session() -> SessionHandle {
  let saved = SessionStore::default_path()
    .map(SessionStore::new)
    .and_then(|store| store.load())
    .filter(|session| !session.is_expired());
  SessionHandle::with_session(saved)
}

async fn login(config_path: Option<&std::path::Path>, creds: CredentialArgs) -> Result<ExitCode> {
  let auth = auth_client(config_path, SessionHandle::new())?;
  match auth.sign_in(&creds.email, &creds.password).await {
    Ok(user) => {
      println!("Sesión iniciada: {}", user.email.as_deref().unwrap_or(&user.id));
      Ok(ExitCode::SUCCESS)
    }
    Err(err) => {
      eprintln!("{}", err.user_message());
      Ok(ExitCode::FAILURE)
    }
  }
}

async fn signup(config_path: Option<&std::path::Path>, creds: CredentialArgs) -> Result<ExitCode> {
  let auth = auth_client(config_path, SessionHandle::new())?;
  match auth.sign_up(&creds.email, &creds.password).await {
    Ok(()) => {
      println!("Cuenta creada. Revisa tu email para confirmar.");
      Ok(ExitCode::SUCCESS)
    }
    Err(err) => {
      eprintln!("{}", err.user_message());
      Ok(ExitCode::FAILURE)
    }
  }
}

async fn logout(config_path: Option<&std::path::Path>) -> Result<ExitCode> {
  let auth = auth_client(config_path, SessionHandle::new())?;
  auth.sign_out().await;
  println!("Sesión cerrada");
  Ok(ExitCode::SUCCESS)
}

fn whoami() -> Result<ExitCode> {
  match session_store()?.load().filter(|s| !s.is_expired()) {
    Some(session) => {
      println!(
        "{} ({})",
        session.user.email.as_deref().unwrap_or("-"),
        session.user.id
      );
      Ok(ExitCode::SUCCESS)
    }
    None => {
      eprintln!("No hay sesión activa");
      Ok(ExitCode::FAILURE)
    }
  }
}
