//! Session and authorization core: role model, session persistence, the
//! mock and remote backends, the session controller, and route guards.

pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod guards;
pub mod messages;
pub mod principal;
pub mod remote;
pub mod roles;
pub mod session_store;
pub mod storage;

pub use config::{AuthConfig, BackendMode};
pub use controller::{AuthPhase, SessionController, SessionSnapshot};
pub use directory::MockDirectory;
pub use error::{AuthError, AuthOutcome, AuthResult};
pub use guards::{
    AuthenticationGuard, GuardDecision, GuardPaths, GuestOnlyGuard, Location, PermissionGuard,
    RoleGuard, RouteGuard,
};
pub use principal::{Principal, Profile, ProfilePatch, ProfileUpdate, SocialLinks};
pub use remote::{RemoteAuthClient, RemoteReply};
pub use roles::Role;
pub use session_store::SessionStore;
pub use storage::{FileStore, KeyValueStore, MemoryStore, PreferencesStore};
