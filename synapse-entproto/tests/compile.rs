//! End-to-end compilation of schema documents

use prost::Message;
use prost_reflect::{Cardinality, Kind, MessageDescriptor};
use prost_types::method_options::IdempotencyLevel;
use synapse_entproto::{
    compile, CompileError, CompiledSchema, CompilerOptions, EntityError, EntityStatus,
    SchemaGraph,
};

const USERS: &str = include_str!("fixtures/users.yaml");
const BLOG: &str = include_str!("fixtures/blog.yaml");

fn compile_yaml(source: &str) -> CompiledSchema {
    let graph = SchemaGraph::from_yaml(source).expect("fixture parses");
    compile(&graph, &CompilerOptions::default()).expect("fixture compiles")
}

fn field_names(message: &MessageDescriptor) -> Vec<String> {
    message.fields().map(|f| f.name().to_string()).collect()
}

#[test]
fn test_user_group_scenario() {
    let compiled = compile_yaml(USERS);
    assert!(compiled.errors().is_empty());

    let user = compiled.message_descriptor("User").unwrap();
    let fields: Vec<(String, u32)> = user
        .fields()
        .map(|f| (f.name().to_string(), f.number()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("id".to_string(), 1),
            ("name".to_string(), 2),
            ("group_id".to_string(), 6),
            ("group".to_string(), 7),
        ]
    );

    let group_id = user.get_field_by_name("group_id").unwrap();
    match group_id.kind() {
        Kind::Message(wrapper) => assert_eq!(wrapper.full_name(), "google.protobuf.Int32Value"),
        other => panic!("group_id should be a wrapper, got {:?}", other),
    }

    let group = user.get_field_by_name("group").unwrap();
    assert_eq!(group.cardinality(), Cardinality::Optional);
    match group.kind() {
        Kind::Message(target) => assert_eq!(target.full_name(), "entpb.Group"),
        other => panic!("group should reference Group, got {:?}", other),
    }

    let file = compiled.file_descriptor("User").unwrap();
    let filter = file
        .parent_pool()
        .get_message_by_name("entpb.ListUserFilter")
        .unwrap();
    assert_eq!(field_names(&filter), vec!["name", "name_in"]);

    let unit = compiled.unit("entpb").unwrap();
    assert!(unit.dependencies.iter().all(|d| d.starts_with("google/protobuf/")));
}

#[test]
fn test_recompilation_is_byte_identical() {
    let first = compile_yaml(BLOG).descriptor_set().encode_to_vec();
    let second = compile_yaml(BLOG).descriptor_set().encode_to_vec();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_field_numbers_are_unique_and_one_is_the_identifier() {
    for source in [USERS, BLOG] {
        let compiled = compile_yaml(source);
        for (entity, status) in compiled.entities() {
            if !matches!(status, EntityStatus::Generated { .. }) {
                continue;
            }
            let graph = SchemaGraph::from_yaml(source).unwrap();
            let id_name = &graph.node(entity).unwrap().id.name;
            let message = compiled.message_descriptor(entity).unwrap();

            let mut numbers: Vec<u32> = message.fields().map(|f| f.number()).collect();
            let count = numbers.len();
            numbers.sort_unstable();
            numbers.dedup();
            assert_eq!(numbers.len(), count, "{} has duplicate numbers", entity);

            for field in message.fields().filter(|f| f.number() == 1) {
                assert_eq!(field.name(), id_name.as_str());
            }
        }
    }
}

#[test]
fn test_cross_package_imports() {
    let compiled = compile_yaml(BLOG);

    let people = compiled.unit("blog.people").unwrap();
    assert_eq!(people.path, "blog/people/people.proto");
    let deps: Vec<&str> = people.dependencies.iter().map(String::as_str).collect();
    assert_eq!(
        deps,
        vec![
            "google/protobuf/timestamp.proto",
            "blog/content/content.proto",
            "google/protobuf/wrappers.proto",
        ]
    );
    assert_eq!(
        deps.iter().filter(|d| **d == "blog/content/content.proto").count(),
        1
    );

    let content = compiled.unit("blog.content").unwrap();
    let deps: Vec<&str> = content.dependencies.iter().map(String::as_str).collect();
    assert_eq!(
        deps,
        vec![
            "google/protobuf/struct.proto",
            "google/protobuf/wrappers.proto",
            "google/protobuf/timestamp.proto",
            "google/protobuf/empty.proto",
        ]
    );

    let author = compiled.message_descriptor("Author").unwrap();
    let posts = author.get_field_by_name("posts").unwrap();
    assert!(posts.is_list());
    match posts.kind() {
        Kind::Message(target) => assert_eq!(target.full_name(), "blog.content.Post"),
        other => panic!("posts should reference Post, got {:?}", other),
    }

    // Imports come before their importers
    let files: Vec<&str> = compiled
        .descriptor_set()
        .file
        .iter()
        .map(|f| f.name())
        .collect();
    let content_at = files.iter().position(|f| *f == "blog/content/content.proto");
    let people_at = files.iter().position(|f| *f == "blog/people/people.proto");
    assert!(content_at < people_at);
    assert_eq!(
        files.iter().filter(|f| f.starts_with("google/protobuf/")).count(),
        4
    );
}

#[test]
fn test_enum_numbering_is_preserved() {
    let compiled = compile_yaml(BLOG);

    let author = compiled.message_descriptor("Author").unwrap();
    let role = author
        .parent_pool()
        .get_enum_by_name("blog.people.Author.Role")
        .unwrap();
    let values: Vec<(String, i32)> = role
        .values()
        .map(|v| (v.name().to_string(), v.number()))
        .collect();
    assert_eq!(
        values,
        vec![
            ("ROLE_WRITER".to_string(), 0),
            ("ROLE_EDITOR".to_string(), 5),
            ("ROLE_GUEST_AUTHOR".to_string(), 9),
        ]
    );

    let post = compiled.message_descriptor("Post").unwrap();
    let state = post
        .parent_pool()
        .get_enum_by_name("blog.content.Post.State")
        .unwrap();
    let names: Vec<String> = state.values().map(|v| v.name().to_string()).collect();
    assert_eq!(names, vec!["STATE_UNSPECIFIED", "DRAFT", "PUBLISHED"]);

    // Optional enums go through the wrapper message
    match post.get_field_by_name("state").unwrap().kind() {
        Kind::Message(wrapper) => {
            assert_eq!(wrapper.full_name(), "blog.content.PostStateEnumValue");
            assert_eq!(field_names(&wrapper), vec!["value"]);
        }
        other => panic!("state should be wrapped, got {:?}", other),
    }
}

#[test]
fn test_field_type_mapping() {
    let compiled = compile_yaml(BLOG);
    let post = compiled.message_descriptor("Post").unwrap();

    let tags = post.get_field_by_name("tags").unwrap();
    assert!(tags.is_list());
    assert_eq!(tags.kind(), Kind::String);

    let metadata = post.get_field_by_name("metadata").unwrap();
    assert!(matches!(metadata.kind(), Kind::Message(m) if m.full_name() == "google.protobuf.Value"));

    let views = post.get_field_by_name("views").unwrap();
    assert!(matches!(views.kind(), Kind::Message(m) if m.full_name() == "google.protobuf.UInt64Value"));

    assert!(post.get_field_by_name("author").is_none());

    let author = compiled.message_descriptor("Author").unwrap();
    assert_eq!(author.get_field_by_name("id").unwrap().kind(), Kind::Bytes);
    assert!(author.get_field_by_name("password_hash").is_none());
    let joined_at = author.get_field_by_name("joined_at").unwrap();
    assert!(matches!(joined_at.kind(), Kind::Message(m) if m.full_name() == "google.protobuf.Timestamp"));
}

#[test]
fn test_filter_combinations() {
    let compiled = compile_yaml(BLOG);
    let pool = compiled.message_descriptor("Author").unwrap().parent_pool().clone();

    let filter = pool.get_message_by_name("blog.people.ListAuthorFilter").unwrap();
    assert_eq!(
        field_names(&filter),
        vec!["email", "email_contains", "role", "role_in"]
    );
    let role_in = filter.get_field_by_name("role_in").unwrap();
    assert!(role_in.is_list());
    assert!(matches!(role_in.kind(), Kind::Enum(e) if e.full_name() == "blog.people.Author.Role"));

    let post_filter = pool.get_message_by_name("blog.content.ListPostFilter").unwrap();
    assert_eq!(field_names(&post_filter), vec!["published_after", "author_email"]);
}

#[test]
fn test_services() {
    let compiled = compile_yaml(BLOG);
    let file = compiled.file_descriptor("Author").unwrap();
    let service = file.services().next().unwrap();
    assert_eq!(service.full_name(), "blog.people.AuthorService");

    let methods: Vec<(String, String, String)> = service
        .methods()
        .map(|m| {
            (
                m.name().to_string(),
                m.input().full_name().to_string(),
                m.output().full_name().to_string(),
            )
        })
        .collect();
    assert_eq!(
        methods,
        vec![
            (
                "Create".to_string(),
                "blog.people.Author".to_string(),
                "blog.people.Author".to_string()
            ),
            (
                "Get".to_string(),
                "google.protobuf.BytesValue".to_string(),
                "blog.people.Author".to_string()
            ),
            (
                "List".to_string(),
                "blog.people.ListAuthorRequest".to_string(),
                "blog.people.ListAuthorResponse".to_string()
            ),
        ]
    );

    let idempotent: Vec<bool> = service
        .methods()
        .map(|m| {
            m.method_descriptor_proto()
                .options
                .as_ref()
                .is_some_and(|o| o.idempotency_level() == IdempotencyLevel::NoSideEffects)
        })
        .collect();
    assert_eq!(idempotent, vec![false, true, true]);

    let post_file = compiled.file_descriptor("Post").unwrap();
    let post_service = post_file.services().next().unwrap();
    let delete = post_service.methods().find(|m| m.name() == "Delete").unwrap();
    assert_eq!(delete.output().full_name(), "google.protobuf.Empty");
}

#[test]
fn test_skipped_entities() {
    let compiled = compile_yaml(BLOG);
    assert_eq!(compiled.skipped(), vec!["Draft"]);
    assert!(matches!(
        compiled.file_descriptor("Draft"),
        Err(EntityError::SchemaSkipped { .. })
    ));
}

#[test]
fn test_list_on_float_identifier_fails_only_that_entity() {
    let doc = r#"
entities:
  - name: Reading
    id: { name: id, type: float64 }
    annotations:
      message: {}
      service: { methods: [list] }
  - name: Sensor
    annotations:
      message: {}
      service: { methods: [list] }
"#;
    let graph = SchemaGraph::from_yaml(doc).unwrap();
    let compiled = compile(&graph, &CompilerOptions::default()).unwrap();

    assert_eq!(
        compiled.status("Reading"),
        Some(&EntityStatus::Failed(EntityError::IdentifierTypeUnsupported {
            entity: "Reading".to_string(),
            id_type: "float64".to_string(),
        }))
    );
    assert!(compiled.message_descriptor("Sensor").is_ok());
    let unit = compiled.unit("entpb").unwrap();
    assert!(!unit.has_message("ListReadingFilter"));
    assert!(!unit.has_message("Reading"));
}

#[test]
fn test_contains_on_non_string_field() {
    let doc = r#"
entities:
  - name: User
    annotations:
      message: {}
      service: {}
    fields:
      - name: age
        type: int32
        annotations:
          field: { number: 2 }
          filter: { mode: [contains] }
"#;
    let graph = SchemaGraph::from_yaml(doc).unwrap();
    let compiled = compile(&graph, &CompilerOptions::default()).unwrap();
    assert!(matches!(
        compiled.file_descriptor("User"),
        Err(EntityError::FilterModeMismatch { .. })
    ));
}

#[test]
fn test_bad_type_override_fails_only_that_entity() {
    let overrides = [
        "type: TYPE_MESSAGE",
        "type: TYPE_ENUM",
        "type: TYPE_ENUM, type_name: google.protobuf.Int32Value",
        "type: TYPE_GROUP, type_name: Legacy",
        "type: TYPE_INT64, type_name: google.protobuf.Int64Value",
    ];
    for annotation in overrides {
        let doc = format!(
            r#"
entities:
  - name: Good
    annotations: {{ message: {{}} }}
    fields:
      - name: label
        type: string
        annotations: {{ field: {{ number: 2 }} }}
  - name: Bad
    annotations: {{ message: {{ package: other }} }}
    fields:
      - name: payload
        type: other
        annotations:
          field: {{ number: 2, {} }}
"#,
            annotation
        );
        let graph = SchemaGraph::from_yaml(&doc).unwrap();
        let compiled = compile(&graph, &CompilerOptions::default())
            .unwrap_or_else(|err| panic!("{} aborted compilation: {}", annotation, err));

        assert!(
            matches!(compiled.status("Good"), Some(EntityStatus::Generated { .. })),
            "{}",
            annotation
        );
        assert!(compiled.message_descriptor("Good").is_ok());
        assert!(
            matches!(
                compiled.status("Bad"),
                Some(EntityStatus::Failed(
                    EntityError::InvalidAnnotation { .. } | EntityError::UnresolvedReference { .. }
                ))
            ),
            "{} gave {:?}",
            annotation,
            compiled.status("Bad")
        );
        assert!(compiled.unit("other").is_none());
    }
}

#[test]
fn test_mutual_cross_package_edges_are_fatal() {
    let doc = r#"
entities:
  - name: A
    annotations: { message: { package: pa } }
    edges:
      - name: b
        target: B
        unique: true
        annotations: { field: { number: 2 } }
  - name: B
    annotations: { message: { package: pb } }
    edges:
      - name: a
        target: A
        unique: true
        annotations: { field: { number: 2 } }
"#;
    let graph = SchemaGraph::from_yaml(doc).unwrap();
    let err = compile(&graph, &CompilerOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::AssemblyFailure { .. }));
}

#[test]
fn test_merged_documents() {
    let users = synapse_entproto::SchemaDocument::from_yaml(USERS).unwrap();
    let blog = synapse_entproto::SchemaDocument::from_yaml(BLOG).unwrap();
    let graph = SchemaGraph::from_documents([users, blog]).unwrap();
    let compiled = compile(&graph, &CompilerOptions::default()).unwrap();
    assert_eq!(compiled.files().len(), 3);

    let again = synapse_entproto::SchemaDocument::from_yaml(USERS).unwrap();
    let duplicate = synapse_entproto::SchemaDocument::from_yaml(USERS).unwrap();
    assert!(matches!(
        SchemaGraph::from_documents([again, duplicate]),
        Err(CompileError::DuplicateEntity(name)) if name == "User"
    ));
}
