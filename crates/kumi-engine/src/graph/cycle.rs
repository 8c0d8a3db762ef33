//! Cycle detection by iterative depth-first search.

use super::PackageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Find one cycle among the nodes accepted by `in_scope`.
///
/// Roots are tried in the order given and neighbours in adjacency order, so
/// for a fixed graph the reported cycle is always the same. The returned ids
/// run from the first node reached on the cycle back around to its
/// predecessor.
pub(super) fn find_cycle<F>(
    forward: &[Vec<PackageId>],
    roots: &[PackageId],
    in_scope: F,
) -> Option<Vec<PackageId>>
where
    F: Fn(PackageId) -> bool,
{
    let mut marks = vec![Mark::Unvisited; forward.len()];
    // (node, index of the next edge to follow)
    let mut stack: Vec<(PackageId, usize)> = Vec::new();

    for &root in roots {
        if !in_scope(root) || marks[root.index()] != Mark::Unvisited {
            continue;
        }
        marks[root.index()] = Mark::OnStack;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let edge = frame.1;
            frame.1 += 1;

            let Some(&next) = forward[node.index()].get(edge) else {
                marks[node.index()] = Mark::Done;
                stack.pop();
                continue;
            };
            if !in_scope(next) {
                continue;
            }

            match marks[next.index()] {
                Mark::Unvisited => {
                    marks[next.index()] = Mark::OnStack;
                    stack.push((next, 0));
                }
                Mark::OnStack => {
                    let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                    return Some(stack[start..].iter().map(|(n, _)| *n).collect());
                }
                Mark::Done => {}
            }
        }
    }

    None
}
