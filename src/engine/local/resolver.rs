// src/engine/local/resolver.rs

//! Small dependency resolver over the pool.
//!
//! Not a constraint solver: it completes the user's marks greedily.
//! - every requirement of a to-install item is satisfied by what stays
//!   installed, by another to-install item, or by the best available provider
//! - installing an edition replaces installed editions of the same name
//! - removing an item removes installed items that would lose a requirement
//! - conflicts are problems unless force-resolve is on, in which case the
//!   conflicting installed item is removed

use std::collections::VecDeque;

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::engine::pool::{arch_compatible, compare_versions, ItemKind, Pool, Transact};
use crate::engine::{Problem, Resolution, ResolverSettings};

pub fn resolve(pool: &mut Pool, settings: &ResolverSettings) -> Resolution {
    let mut problems: Vec<Problem> = Vec::new();

    if settings.upgrade_mode || settings.update_mode {
        mark_updates(pool);
    }

    close_installs(pool, &mut problems);
    mark_replacements(pool);

    let graph = dependency_graph(pool);
    remove_dependents(pool, &graph);
    if settings.cleandeps_on_remove {
        remove_unneeded(pool, &graph);
    }

    check_conflicts(pool, settings.force_resolve, &mut problems);

    if problems.is_empty() {
        Resolution::Solved
    } else {
        debug!(count = problems.len(), "resolver found problems");
        Resolution::Unsatisfiable(problems)
    }
}

/// Still present once the plan is carried out.
fn present(pool: &Pool, index: usize) -> bool {
    pool.get(index).is_some_and(|item| {
        (item.installed && !item.status.is_to_uninstall()) || item.status.is_to_install()
    })
}

fn satisfied(pool: &Pool, capability: &str) -> bool {
    pool.iter()
        .enumerate()
        .any(|(i, item)| item.provides_name(capability) && present(pool, i))
}

fn best_provider(pool: &Pool, capability: &str, arch: &str) -> Option<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, item)| !item.installed && item.provides_name(capability))
        .filter(|(_, item)| arch_compatible(&item.id.arch, arch))
        .max_by(|(_, a), (_, b)| compare_versions(&a.id.version, &b.id.version))
        .map(|(i, _)| i)
}

fn mark_updates(pool: &mut Pool) {
    let mut upgrades = Vec::new();
    for item in pool.iter().filter(|i| i.installed && i.kind == ItemKind::Package) {
        if let Some(best) = pool.best_available(&item.id.name, &item.id.arch) {
            if compare_versions(&best.id.version, &item.id.version).is_gt() {
                upgrades.push(best.id.clone());
            }
        }
    }
    for id in upgrades {
        if let Some(item) = pool.find_mut(&id) {
            if item.status == Transact::Untouched {
                item.status = Transact::ToInstall;
            }
        }
    }
}

fn close_installs(pool: &mut Pool, problems: &mut Vec<Problem>) {
    let mut queue: VecDeque<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, item)| item.status.is_to_install())
        .map(|(i, _)| i)
        .collect();

    while let Some(index) = queue.pop_front() {
        let Some(item) = pool.get(index).cloned() else {
            continue;
        };

        for capability in &item.requires {
            if satisfied(pool, capability) {
                continue;
            }
            match best_provider(pool, capability, &item.id.arch) {
                Some(provider) => {
                    if let Some(p) = pool.get_mut(provider) {
                        p.status = Transact::ToInstall;
                    }
                    queue.push_back(provider);
                }
                None => problems.push(Problem {
                    description: format!(
                        "nothing provides '{}' needed by {}",
                        capability,
                        item.id.ident()
                    ),
                    details: format!("{} requires {}", item.id, capability),
                }),
            }
        }
    }
}

fn mark_replacements(pool: &mut Pool) {
    let incoming: Vec<(String, String, Vec<String>)> = pool
        .iter()
        .filter(|item| item.status.is_to_install())
        .map(|item| {
            (
                item.id.name.clone(),
                item.id.arch.clone(),
                item.obsoletes.clone(),
            )
        })
        .collect();

    for item in pool.iter_mut().filter(|i| i.installed) {
        if item.status != Transact::Untouched {
            continue;
        }
        for (name, arch, obsoletes) in &incoming {
            if &item.id.name == name && arch_compatible(&item.id.arch, arch) {
                item.status = Transact::ToRemoveDueToUpgrade;
                break;
            }
            if obsoletes.iter().any(|o| o == &item.id.name) {
                item.status = Transact::ToRemoveDueToObsolete;
                break;
            }
        }
    }
}

/// Edges point from an installed item to the installed items providing its
/// requirements.
fn dependency_graph(pool: &Pool) -> DiGraphMap<usize, ()> {
    let mut graph = DiGraphMap::new();
    let installed: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, item)| item.installed)
        .map(|(i, _)| i)
        .collect();

    for &dependent in &installed {
        graph.add_node(dependent);
        let Some(item) = pool.get(dependent) else {
            continue;
        };
        for capability in &item.requires {
            for &provider in &installed {
                if provider != dependent
                    && pool.get(provider).is_some_and(|p| p.provides_name(capability))
                {
                    graph.add_edge(dependent, provider, ());
                }
            }
        }
    }
    graph
}

fn requirements_met(pool: &Pool, index: usize) -> bool {
    pool.get(index)
        .is_none_or(|item| item.requires.iter().all(|cap| satisfied(pool, cap)))
}

fn remove_dependents(pool: &mut Pool, graph: &DiGraphMap<usize, ()>) {
    let mut stack: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, item)| item.installed && item.status.is_to_uninstall())
        .map(|(i, _)| i)
        .collect();

    while let Some(removed) = stack.pop() {
        if !graph.contains_node(removed) {
            continue;
        }
        let dependents: Vec<usize> = graph
            .neighbors_directed(removed, Direction::Incoming)
            .collect();
        for dependent in dependents {
            if !present(pool, dependent) || requirements_met(pool, dependent) {
                continue;
            }
            if let Some(item) = pool.get_mut(dependent) {
                debug!(package = %item.id, "removing dependent");
                item.status = Transact::ToRemove;
            }
            stack.push(dependent);
        }
    }
}

fn remove_unneeded(pool: &mut Pool, graph: &DiGraphMap<usize, ()>) {
    let mut stack: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, item)| item.installed && item.status == Transact::ToRemove)
        .map(|(i, _)| i)
        .collect();

    while let Some(removed) = stack.pop() {
        if !graph.contains_node(removed) {
            continue;
        }
        let providers: Vec<usize> = graph
            .neighbors_directed(removed, Direction::Outgoing)
            .collect();
        for provider in providers {
            if !present(pool, provider) || pool.get(provider).is_none_or(|p| p.status.is_to_install()) {
                continue;
            }
            let still_needed = graph
                .neighbors_directed(provider, Direction::Incoming)
                .any(|user| present(pool, user));
            if still_needed {
                continue;
            }
            if let Some(item) = pool.get_mut(provider) {
                debug!(package = %item.id, "removing unneeded dependency");
                item.status = Transact::ToRemove;
            }
            stack.push(provider);
        }
    }
}

fn check_conflicts(pool: &mut Pool, force: bool, problems: &mut Vec<Problem>) {
    let count = pool.len();
    let mut clashes: Vec<(usize, usize)> = Vec::new();

    for a in 0..count {
        if !present(pool, a) {
            continue;
        }
        let Some(item) = pool.get(a) else {
            continue;
        };
        for capability in &item.conflicts {
            for b in 0..count {
                if a != b
                    && present(pool, b)
                    && pool.get(b).is_some_and(|other| other.provides_name(capability))
                {
                    clashes.push((a, b));
                }
            }
        }
    }

    for (a, b) in clashes {
        if !present(pool, a) || !present(pool, b) {
            continue;
        }

        // Under force-resolve the installed side of the clash goes away.
        let victim = [a, b]
            .into_iter()
            .find(|&i| pool.get(i).is_some_and(|item| item.installed && !item.status.is_to_install()));
        if let (true, Some(victim)) = (force, victim) {
            if let Some(item) = pool.get_mut(victim) {
                debug!(package = %item.id, "removing conflicting item (forced)");
                item.status = Transact::ToRemove;
            }
            continue;
        }

        let (Some(left), Some(right)) = (pool.get(a), pool.get(b)) else {
            continue;
        };
        let description = format!("{} conflicts with {}", left.id.ident(), right.id.ident());
        let mirrored = format!("{} conflicts with {}", right.id.ident(), left.id.ident());
        if problems
            .iter()
            .any(|p| p.description == description || p.description == mirrored)
        {
            continue;
        }
        problems.push(Problem {
            description,
            details: format!("{} conflicts with {}", left.id, right.id),
        });
    }
}
