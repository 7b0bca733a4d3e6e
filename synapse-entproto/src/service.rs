//! Service synthesis
//!
//! `<Entity>Service` exposes the requested subset of Create, Get, Update,
//! Delete and List, always in that order. Get and Delete take the
//! identifier's wrapper message; Get and List are marked side-effect free.

use prost_types::method_options::IdempotencyLevel;
use prost_types::{DescriptorProto, MethodDescriptorProto, MethodOptions, ServiceDescriptorProto};

use crate::annotations::{Method, ServiceAnnotation};
use crate::error::EntityError;
use crate::filter::{build_list_messages, request_message_name, response_message_name};
use crate::schema::SchemaNode;
use crate::types::{optional_wrapper, EMPTY};

/// Service plus the messages its methods introduce
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOutput {
    /// `<Entity>Service`
    pub service: ServiceDescriptorProto,
    /// List filter, request and response messages
    pub messages: Vec<DescriptorProto>,
}

/// `<Entity>Service`
pub fn service_name(entity: &str) -> String {
    format!("{}Service", entity)
}

/// Synthesize the service of `node`
pub fn build_service(
    node: &SchemaNode,
    annotation: &ServiceAnnotation,
) -> Result<ServiceOutput, EntityError> {
    let entity = node.name.as_str();
    let mut service = ServiceDescriptorProto {
        name: Some(service_name(entity)),
        ..Default::default()
    };
    let mut messages = Vec::new();

    for method in annotation.methods.iter() {
        let descriptor = match method {
            Method::Create | Method::Update => rpc(method, entity, entity, false),
            Method::Get => rpc(method, identifier_wrapper(node)?, entity, true),
            Method::Delete => rpc(method, identifier_wrapper(node)?, EMPTY, false),
            Method::List => {
                messages.extend(build_list_messages(node)?);
                rpc(
                    method,
                    &request_message_name(entity),
                    &response_message_name(entity),
                    true,
                )
            }
        };
        service.method.push(descriptor);
    }

    Ok(ServiceOutput { service, messages })
}

fn identifier_wrapper(node: &SchemaNode) -> Result<&'static str, EntityError> {
    optional_wrapper(node.id.kind).ok_or_else(|| EntityError::UnsupportedType {
        field: format!("{}.{}", node.name, node.id.name),
        field_type: format!("optional {}", node.id.kind),
    })
}

fn rpc(method: Method, input: &str, output: &str, no_side_effects: bool) -> MethodDescriptorProto {
    let options = no_side_effects.then(|| MethodOptions {
        idempotency_level: Some(IdempotencyLevel::NoSideEffects as i32),
        ..Default::default()
    });
    MethodDescriptorProto {
        name: Some(method.name().to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        options,
        ..Default::default()
    }
}
