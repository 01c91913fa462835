//! `apply Service` rules.

use crate::config::ConfigItemBuilder;
use crate::expression::Expression;
use crate::objects::{Checkable, HOST_TYPE, SERVICE_TYPE};

use super::kind::ApplyKind;
use super::rule::ApplyRule;

/// Services applied to hosts. Host is the only target, so rules may leave
/// the target type out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceKind;

impl ApplyKind for ServiceKind {
    fn type_name(&self) -> &'static str {
        SERVICE_TYPE
    }

    fn target_types(&self) -> &'static [&'static str] {
        &[HOST_TYPE]
    }

    fn object_name(&self, checkable: &Checkable, short_name: &str) -> String {
        let (host, _) = checkable.host_service();
        format!("{}!{short_name}", host.name)
    }

    fn inject_relations(&self, builder: &mut ConfigItemBuilder, checkable: &Checkable, rule: &ApplyRule) {
        let (host, _) = checkable.host_service();

        builder.add_expression(Expression::set_literal("host_name", host.name.as_str()));

        if let Some(zone) = host.zone.as_deref().filter(|z| !z.is_empty()) {
            builder.add_expression(Expression::set_literal("zone", zone));
        }

        builder.add_expression(Expression::set_literal("package", rule.package()));
    }
}
