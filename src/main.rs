use std::io::{self, Write};
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use portal_session::auth::{
    AuthConfig, AuthOutcome, ProfilePatch, ProfileUpdate, Role, SessionController,
};

#[derive(Parser, Debug)]
#[command(
    name = "portal-session",
    about = "Inspect and drive the portal session from the command line"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current session.
    Status,
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in as it.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the current session.
    Logout,
    /// Update the signed-in profile. Omitted fields are left unchanged.
    UpdateProfile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Replaces the whole skill list; repeat the flag for several skills.
        #[arg(long = "skill")]
        skills: Vec<String>,
    },
    /// Change the password through the remote authority.
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Refresh the session token; a failure ends the session.
    Refresh,
    /// Check a capability of the current session.
    #[command(group(ArgGroup::new("capability").required(true).args(["role", "permission"])))]
    Check {
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
        #[arg(long)]
        permission: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RoleArg {
    Guest,
    Member,
    Core,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Guest => Role::Guest,
            RoleArg::Member => Role::Member,
            RoleArg::Core => Role::Core,
            RoleArg::Admin => Role::Admin,
        }
    }
}

fn report(outcome: &AuthOutcome) -> io::Result<ExitCode> {
    if outcome.success {
        writeln!(io::stdout(), "{}", outcome.message)?;
        Ok(ExitCode::SUCCESS)
    } else {
        writeln!(io::stderr(), "error: {}", outcome.message)?;
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    portal_session::init_logger();

    let args = Args::parse();
    let config = AuthConfig::from_env()?;
    let controller = SessionController::from_config(&config).await?;

    let code = match args.command {
        Command::Status => {
            let snapshot = controller.snapshot();
            match snapshot.principal {
                Some(principal) => {
                    writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&principal)?)?;
                }
                None => writeln!(io::stdout(), "anonymous")?,
            }
            ExitCode::SUCCESS
        }
        Command::Login { email, password } => {
            report(&controller.login(&email, &password).await)?
        }
        Command::Register {
            name,
            email,
            password,
        } => report(&controller.register(&name, &email, &password).await)?,
        Command::Logout => report(&controller.logout().await)?,
        Command::UpdateProfile {
            name,
            email,
            title,
            department,
            bio,
            skills,
        } => {
            let touches_profile =
                title.is_some() || department.is_some() || bio.is_some() || !skills.is_empty();
            let update = ProfileUpdate {
                name,
                email,
                profile: touches_profile.then(|| ProfilePatch {
                    title,
                    department,
                    bio,
                    skills: (!skills.is_empty()).then_some(skills),
                    ..Default::default()
                }),
            };
            report(&controller.update_profile(update).await)?
        }
        Command::ChangePassword { current, new } => {
            report(&controller.change_password(&current, &new).await)?
        }
        Command::Refresh => report(&controller.refresh_token().await)?,
        Command::Check { role, permission } => {
            let allowed = match (role, permission) {
                (Some(role), _) => controller.has_role(role.into()),
                (None, Some(permission)) => controller.has_permission(&permission),
                (None, None) => false,
            };
            writeln!(io::stdout(), "{}", if allowed { "allowed" } else { "denied" })?;
            if allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    };

    Ok(code)
}
