//! Client-side controllers for the easy-deploy executor.
//!
//! Two long-lived sessions are driven from here:
//! - [`build::BuildPipeline`] steps a remote image build through clone,
//!   Dockerfile generation and build & push, inferring progress from the
//!   executor's free-text status messages.
//! - [`console::Console`] sends `kubectl` commands and deploy/stop requests and
//!   tracks which resources are still waiting for an answer.
//!
//! Both share the classified [`transcript::Transcript`] and talk to the network
//! through the `deploy_transport` traits.

pub mod build;
pub mod cli;
pub mod config;
pub mod console;
pub mod gateway;
pub mod logging;
pub mod transcript;

pub use build::{BuildArtifact, BuildError, BuildPipeline, Phase};
pub use config::Config;
pub use console::{Console, ConsoleError, ConsoleUpdate};
pub use gateway::{BuildCredential, CredentialGateway, GatewayError, HttpGateway};
pub use transcript::{Entry, Tag, Transcript};
