//! Built-in sample rules, one or more per payload family.
//!
//! | Name | Applies to |
//! |------|------------|
//! | `Common.Core.0001` | any non-empty response |
//! | `Common.Core.0002` | any response |
//! | `ServiceDoc.Core.1001` | JSON Light service documents |
//! | `Entry.Core.2001` | JSON Light entries, metadata required |
//! | `Feed.Core.2002` | JSON Light feeds |
//! | `Feed.Core.2003` | Atom feeds |
//! | `Entry.Core.2010` | Atom media link entries |
//! | `Entry.Core.2011` | JSON verbose entries |
//! | `Error.Core.3001` | V4 JSON error responses |
//! | `IndividualProperty.Core.4201` | JSON Light individual properties, metadata required |
//! | `Metadata.Core.5001` | metadata documents |

mod common;
mod json;
mod xml;

use super::{FnRule, Rule, RuleDescriptor, RuleError, RuleVerdict};
use crate::context::ServiceContext;
use std::sync::Arc;

/// All built-in rules in registration order.
pub fn all() -> Vec<Arc<dyn Rule>> {
    let mut rules = common::rules();
    rules.extend(json::rules());
    rules.extend(xml::rules());
    rules
}

fn fn_rule<F>(descriptor: RuleDescriptor, func: F) -> Arc<dyn Rule>
where
    F: Fn(&ServiceContext) -> Result<RuleVerdict, RuleError> + Send + Sync + 'static,
{
    Arc::new(FnRule::new(descriptor, func))
}
