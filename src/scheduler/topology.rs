#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// The result of [`sort`].
#[derive(Debug)]
pub(super) struct Sorted {
    /// Every node exactly once, each after all of its acyclic dependencies.
    pub(super) order:  Vec<usize>,
    /// Nodes with a dependency edge that closes a cycle, in discovery order.
    pub(super) cyclic: Vec<usize>,
}

/// Topologically sorts nodes where `dependencies[a]` lists the nodes that must precede `a`.
///
/// Uses an explicit stack instead of recursion.
/// A back edge is reported in [`Sorted::cyclic`] and skipped;
/// the node is still emitted when its own frame finishes.
pub(super) fn sort(dependencies: &[Vec<usize>]) -> Sorted {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    let mut order = Vec::with_capacity(dependencies.len());
    let mut cyclic = Vec::new();
    // (node, position of the next dependency to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..dependencies.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        marks[root] = Mark::Visiting;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&dependency) = dependencies[node].get(frame.1) else {
                marks[node] = Mark::Done;
                order.push(node);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dependency] {
                Mark::Unvisited => {
                    marks[dependency] = Mark::Visiting;
                    stack.push((dependency, 0));
                }
                Mark::Visiting => {
                    if !cyclic.contains(&node) {
                        cyclic.push(node);
                    }
                }
                Mark::Done => {}
            }
        }
    }

    Sorted { order, cyclic }
}
