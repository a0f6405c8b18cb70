//! Delegated handler matching.

use std::rc::Rc;

use cherry_dom::{Node, SelectorList};

/// Find the element a delegated handler fires for.
///
/// Candidates are the current descendants of `scope` matching the selector,
/// in document order. For each, the path from `target` up to (not including)
/// `root` is searched; the first candidate found on it wins.
pub(crate) fn find_delegate_target(
    root: &Rc<Node>,
    scope: &Node,
    selector: &SelectorList,
    target: &Rc<Node>,
) -> Option<Rc<Node>> {
    for candidate in selector.select_all(scope) {
        let mut current = Some(target.clone());
        while let Some(node) = current {
            if Rc::ptr_eq(&node, root) {
                break;
            }
            if Rc::ptr_eq(&node, &candidate) {
                return Some(candidate);
            }
            current = node.parent();
        }
    }
    None
}
