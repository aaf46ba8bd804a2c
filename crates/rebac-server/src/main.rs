//! rebac demo binary
//!
//! Creates an organization/project model, writes a handful of
//! relationships and prints the results of a few queries.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! rebac --config config.yaml
//!
//! # With environment variables only
//! REBAC_LOGGING__LEVEL=debug rebac
//! ```

use clap::Parser;
use tracing::info;

use rebac_domain::model::{AuthorizationModel, Tuple, TypeConstraint, TypeDefinition, Userset};
use rebac_domain::resolver::{
    CheckRequest, ExpandRequest, ListObjectsRequest, ListUsersRequest, UserFilter,
};
use rebac_domain::QueryContext;
use rebac_server::observability::{init_logging, LoggingConfig};
use rebac_server::{AuthorizationService, RebacConfig};

/// rebac - relationship-based access control engine demo
#[derive(Parser, Debug)]
#[command(name = "rebac")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => RebacConfig::load(&path)?,
        None => RebacConfig::from_env()?,
    };

    init_logging(LoggingConfig::from(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "Starting rebac demo");

    let service = AuthorizationService::in_memory(&config);

    let model_id = service.create_model(organization_model())?;
    println!("Authorization model ID: {model_id}");

    let snapshot = service
        .write_tuples(&model_id, relationships()?, Vec::new())
        .await?;
    println!("Relationships created at snapshot {snapshot}");

    let ctx = QueryContext::new(&model_id).with_snapshot(snapshot);

    for (user, relation, object) in [
        ("user:alice", "admin", "organization:acme"),
        ("user:bob", "viewer", "project:api"),
        ("user:bob", "owner", "project:api"),
    ] {
        let result = service
            .check(&CheckRequest::new(user, relation, object), &ctx)
            .await?;
        println!("{user} is {relation} of {object}: {}", result.allowed);
    }

    let admin_of = service
        .list_objects(
            &ListObjectsRequest::new("user:alice", "admin", "organization"),
            &ctx,
        )
        .await?;
    println!("Alice can admin: {:?}", admin_of.objects);

    let viewable = service
        .list_objects(&ListObjectsRequest::new("user:bob", "viewer", "project"), &ctx)
        .await?;
    println!("Bob can view: {:?}", viewable.objects);

    let viewers = service
        .list_users(
            &ListUsersRequest::new("project:api", "viewer").with_filter(UserFilter::new("user")),
            &ctx,
        )
        .await?;
    let names: Vec<String> = viewers.users.iter().map(ToString::to_string).collect();
    println!("Viewers of project:api: {names:?}");

    let tree = service
        .expand(&ExpandRequest::new("viewer", "project:api"), &ctx)
        .await?;
    println!("Expansion of project:api#viewer: {:#?}", tree.tree.root);

    Ok(())
}

/// Organizations with admins and members; projects inherit membership
/// from their organization.
fn organization_model() -> AuthorizationModel {
    let users = || vec![TypeConstraint::new("user")];
    AuthorizationModel::new("1.1")
        .with_type(TypeDefinition::new("user"))
        .with_type(
            TypeDefinition::new("organization")
                .with_relation("admin", Userset::direct(users()))
                .with_relation(
                    "member",
                    Userset::union(vec![Userset::direct(users()), Userset::computed("admin")]),
                ),
        )
        .with_type(
            TypeDefinition::new("project")
                .with_relation(
                    "organization",
                    Userset::direct(vec![TypeConstraint::new("organization")]),
                )
                .with_relation("owner", Userset::direct(users()))
                .with_relation(
                    "editor",
                    Userset::union(vec![Userset::direct(users()), Userset::computed("owner")]),
                )
                .with_relation(
                    "viewer",
                    Userset::union(vec![
                        Userset::direct(users()),
                        Userset::computed("editor"),
                        Userset::tuple_to_userset("organization", "member"),
                    ]),
                ),
        )
}

fn relationships() -> anyhow::Result<Vec<Tuple>> {
    [
        ("user:alice", "admin", "organization:acme"),
        ("user:bob", "member", "organization:acme"),
        ("organization:acme", "organization", "project:api"),
        ("user:alice", "owner", "project:api"),
    ]
    .into_iter()
    .map(|(user, relation, object)| {
        Tuple::parse(user, relation, object)
            .map_err(|e| anyhow::anyhow!("invalid tuple {object}#{relation}@{user}: {e}"))
    })
    .collect()
}
