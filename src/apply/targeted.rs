//! Static analysis of `assign where` filters for the targeted fast path.
//!
//! A filter is targeted when it is an OR-tree whose every leaf pins the
//! candidate to a literal name:
//!
//! ```text
//! host.name == "a" || "b" == host.name
//! (host.name == "a" && service.name == "ping") || (service.name == "x" && host.name == "b")
//! ```
//!
//! Any other leaf anywhere in the tree rejects the whole filter, which then
//! has to be evaluated per candidate.

use crate::expression::Expression;
use crate::value::Value;

/// Literal host names a host-targeting filter is equivalent to, in first
/// occurrence order without duplicates. `None` if the filter has any other
/// shape.
#[must_use]
pub fn target_hosts(filter: &Expression) -> Option<Vec<&str>> {
    let mut hosts = Vec::new();
    if !collect_hosts(filter, &mut hosts) {
        return None;
    }
    dedup_in_order(&mut hosts);
    Some(hosts)
}

/// Literal (host, service) name pairs a service-targeting filter is
/// equivalent to. `None` if the filter has any other shape.
#[must_use]
pub fn target_services(filter: &Expression) -> Option<Vec<(&str, &str)>> {
    let mut services = Vec::new();
    if !collect_services(filter, &mut services) {
        return None;
    }
    dedup_in_order(&mut services);
    Some(services)
}

fn dedup_in_order<T: PartialEq + Copy>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(*item);
            true
        }
    });
}

fn collect_hosts<'a>(filter: &'a Expression, hosts: &mut Vec<&'a str>) -> bool {
    if let Expression::LogicalOr(left, right) = filter {
        return collect_hosts(left, hosts) && collect_hosts(right, hosts);
    }

    match compared_name(filter, "host") {
        Some(name) => {
            hosts.push(name);
            true
        }
        None => false,
    }
}

fn collect_services<'a>(filter: &'a Expression, services: &mut Vec<(&'a str, &'a str)>) -> bool {
    if let Expression::LogicalOr(left, right) = filter {
        return collect_services(left, services) && collect_services(right, services);
    }

    match target_service(filter) {
        Some(pair) => {
            services.push(pair);
            true
        }
        None => false,
    }
}

/// `host.name == "h" && service.name == "s"`, in either operand order.
fn target_service(filter: &Expression) -> Option<(&str, &str)> {
    let Expression::LogicalAnd(left, right) = filter else {
        return None;
    };

    if let Some(host) = compared_name(left, "host") {
        let service = compared_name(right, "service")?;
        return Some((host, service));
    }

    let service = compared_name(left, "service")?;
    let host = compared_name(right, "host")?;
    Some((host, service))
}

/// The literal in `<var>.name == "<literal>"` (either operand order).
fn compared_name<'a>(expr: &'a Expression, var: &str) -> Option<&'a str> {
    let Expression::Equal(left, right) = expr else {
        return None;
    };

    if is_name_indexer(left, var) {
        return literal_str(right);
    }

    if is_name_indexer(right, var) {
        return literal_str(left);
    }

    None
}

fn is_name_indexer(expr: &Expression, var: &str) -> bool {
    let Expression::Indexer { base, index } = expr else {
        return false;
    };

    matches!(base.as_ref(), Expression::Variable(name) if name == var)
        && literal_str(index) == Some("name")
}

fn literal_str(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::Literal(Value::String(s)) => Some(s),
        _ => None,
    }
}
