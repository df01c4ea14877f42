//! Validation and ordering of parent links for bone and joint hierarchies.
use thiserror::Error;

/// Errors for parent links that do not form a forest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("node {index} has parent index {parent} but there are only {count} nodes")]
    InvalidParent {
        index: usize,
        parent: usize,
        count: usize,
    },

    #[error("node {index} is its own ancestor")]
    Cycle { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Computes an order where every parent precedes its children.
/// Nodes already in a valid order keep their relative order.
///
/**
```rust
use gla_lib::hierarchy::evaluation_order;

// The child is stored before its parent.
let order = evaluation_order(&[Some(1), None]).unwrap();
assert_eq!(vec![1, 0], order);
```
 */
pub fn evaluation_order(parents: &[Option<usize>]) -> Result<Vec<usize>, HierarchyError> {
    let count = parents.len();
    if let Some((index, parent)) = parents
        .iter()
        .enumerate()
        .find_map(|(i, p)| p.filter(|p| *p >= count).map(|p| (i, p)))
    {
        return Err(HierarchyError::InvalidParent {
            index,
            parent,
            count,
        });
    }

    let mut marks = vec![Mark::Unvisited; count];
    let mut order = Vec::with_capacity(count);
    let mut chain = Vec::new();

    for start in 0..count {
        // Walk up until reaching a node that is already ordered.
        let mut current = Some(start);
        while let Some(index) = current {
            match marks[index] {
                Mark::Done => break,
                Mark::InProgress => return Err(HierarchyError::Cycle { index }),
                Mark::Unvisited => {
                    marks[index] = Mark::InProgress;
                    chain.push(index);
                    current = parents[index];
                }
            }
        }

        while let Some(index) = chain.pop() {
            marks[index] = Mark::Done;
            order.push(index);
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_empty() {
        assert_eq!(Ok(Vec::new()), evaluation_order(&[]));
    }

    #[test]
    fn order_already_sorted() {
        assert_eq!(
            Ok(vec![0, 1, 2, 3]),
            evaluation_order(&[None, Some(0), Some(0), Some(2)])
        );
    }

    #[test]
    fn order_children_before_parents() {
        assert_eq!(
            Ok(vec![2, 1, 0, 3]),
            evaluation_order(&[Some(1), Some(2), None, Some(2)])
        );
    }

    #[test]
    fn order_multiple_roots() {
        assert_eq!(Ok(vec![0, 1, 2]), evaluation_order(&[None, None, Some(1)]));
    }

    #[test]
    fn self_parent_is_cycle() {
        assert_eq!(
            Err(HierarchyError::Cycle { index: 0 }),
            evaluation_order(&[Some(0)])
        );
    }

    #[test]
    fn two_node_cycle() {
        assert!(matches!(
            evaluation_order(&[None, Some(2), Some(1)]),
            Err(HierarchyError::Cycle { .. })
        ));
    }

    #[test]
    fn parent_out_of_range() {
        assert_eq!(
            Err(HierarchyError::InvalidParent {
                index: 1,
                parent: 5,
                count: 2
            }),
            evaluation_order(&[None, Some(5)])
        );
    }
}
