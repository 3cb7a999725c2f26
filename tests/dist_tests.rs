//! Distribution builds and deployment anchors

mod common;

use std::fs;

use common::{object_schema, Fixture, PRIVATE_ROOT};
use git2::{Commit, Repository, Signature};
use json_schema_manager::checksum::{Checksum, CHECKSUMS_FILENAME};
use json_schema_manager::{DistBuilder, Gitter, SchemaError};
use serde_json::Value;

fn commit_all(repo: &Repository) {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Schema Registry", "schemas@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "schemas", &tree, &parents)
        .unwrap();
}

#[test]
fn test_build_all() {
    let fx = Fixture::new();
    fx.write_json_schema("acme_a_1_0_0", object_schema(&[]));
    fx.write_json_schema("acme_b_1_0_0", object_schema(&["id"]));
    fx.write_json_schema("acme_b_1_1_0", object_schema(&["id"]));
    let out = tempfile::tempdir().unwrap();

    let mut builder = DistBuilder::new(&fx.registry, out.path());
    builder.set_num_workers(2);
    assert_eq!(builder.build_all("prod").unwrap(), 3);

    let env_dir = out.path().join("prod");
    let rendered = fs::read(env_dir.join("acme_b_1_1_0.schema.json")).unwrap();
    let document: Value = serde_json::from_slice(&rendered).unwrap();
    assert_eq!(
        document["$id"],
        Value::String(format!("{}/acme_b_1_1_0.schema.json", PRIVATE_ROOT))
    );

    let listing = fs::read_to_string(env_dir.join(CHECKSUMS_FILENAME)).unwrap();
    let lines: Vec<_> = listing.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("  acme_a_1_0_0.schema.json"));
    let expected = format!("{}  acme_b_1_1_0.schema.json", Checksum::from_bytes(&rendered));
    assert!(lines.contains(&expected.as_str()));
}

#[test]
fn test_build_changed_respects_mutation_policy() {
    let fx = Fixture::new();
    let repo = Repository::init(fx.registry.root()).unwrap();
    let existing = fx.write_json_schema("acme_a_1_0_0", object_schema(&[]));
    commit_all(&repo);

    let gitter = Gitter::open(fx.registry.root()).unwrap();
    gitter.tag_deployment_success("prod").unwrap();
    gitter.tag_deployment_success("staging").unwrap();
    let out = tempfile::tempdir().unwrap();
    let builder = DistBuilder::new(&fx.registry, out.path());

    // nothing changed yet
    let anchor = gitter.latest_anchor("prod").unwrap();
    assert_eq!(builder.build_changed("prod", &anchor, &gitter).unwrap(), 0);

    // new schemas may always ship
    fx.write_json_schema("acme_b_1_0_0", object_schema(&[]));
    assert_eq!(builder.build_changed("prod", &anchor, &gitter).unwrap(), 1);
    assert!(out.path().join("prod/acme_b_1_0_0.schema.json").is_file());

    // changing a deployed one only where mutation is allowed
    fs::write(
        fx.registry.schema_path(&existing),
        serde_json::to_string(&object_schema(&["id"])).unwrap(),
    )
    .unwrap();
    fx.registry.reset();
    assert!(matches!(
        builder.build_changed("prod", &anchor, &gitter),
        Err(SchemaError::SchemaMutationNotAllowed { .. })
    ));

    let staging = gitter.latest_anchor("staging").unwrap();
    assert_eq!(builder.build_changed("staging", &staging, &gitter).unwrap(), 2);
}

#[test]
fn test_build_changed_without_anchor() {
    let fx = Fixture::new();
    let repo = Repository::init(fx.registry.root()).unwrap();
    fx.write_json_schema("acme_a_1_0_0", object_schema(&[]));
    commit_all(&repo);

    let gitter = Gitter::open(fx.registry.root()).unwrap();
    assert!(matches!(
        gitter.latest_anchor("prod"),
        Err(SchemaError::NoDeploymentAnchor { .. })
    ));
}
