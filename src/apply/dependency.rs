//! `apply Dependency` rules.

use crate::config::ConfigItemBuilder;
use crate::expression::Expression;
use crate::objects::{Checkable, HOST_TYPE, SERVICE_TYPE};

use super::kind::ApplyKind;
use super::rule::ApplyRule;

/// Type name of dependency objects.
pub const DEPENDENCY_TYPE: &str = "Dependency";

/// Dependencies applied to hosts and services.
///
/// The matched object becomes the child, and by default also the parent
/// host; rule bodies usually override `parent_host_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyKind;

impl ApplyKind for DependencyKind {
    fn type_name(&self) -> &'static str {
        DEPENDENCY_TYPE
    }

    fn target_types(&self) -> &'static [&'static str] {
        &[HOST_TYPE, SERVICE_TYPE]
    }

    /// `<child host>!<name>` or `<child host>!<child service>!<name>`.
    fn object_name(&self, checkable: &Checkable, short_name: &str) -> String {
        match checkable.host_service() {
            (host, None) => format!("{}!{short_name}", host.name),
            (host, Some(service)) => format!("{}!{}!{short_name}", host.name, service.short_name),
        }
    }

    fn inject_relations(&self, builder: &mut ConfigItemBuilder, checkable: &Checkable, rule: &ApplyRule) {
        let (host, service) = checkable.host_service();

        builder
            .add_expression(Expression::set_literal("parent_host_name", host.name.as_str()))
            .add_expression(Expression::set_literal("child_host_name", host.name.as_str()));

        if let Some(service) = service {
            builder.add_expression(Expression::set_literal("child_service_name", service.short_name.as_str()));
        }

        if let Some(zone) = checkable.zone_name().filter(|z| !z.is_empty()) {
            builder.add_expression(Expression::set_literal("zone", zone));
        }

        builder.add_expression(Expression::set_literal("package", rule.package()));
    }
}
