//! A generic intrusive doubly linked list with sentinel head/tail nodes.
//!
//! Backs both the segment collection's segment chain and the overlap
//! graph's per-vertex edge lists. Nodes are individually addressable
//! (`NodeRef`) so callers can hold on to a node across other mutations of
//! the list and splice around it directly, the way the reference list
//! implementation's `struct list_node *` handles work.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

struct Node<T> {
    value: RefCell<Option<T>>,
    prev: RefCell<Weak<Node<T>>>,
    next: RefCell<Option<Rc<Node<T>>>>,
}

/// A handle to a single node in a [`List`]. Cheap to clone (it's a
/// reference-counted pointer); two handles are the same node iff
/// [`NodeRef::same_node`] is true.
#[derive(Clone)]
pub struct NodeRef<T>(Rc<Node<T>>);

impl<T> NodeRef<T> {
    fn is_sentinel(&self) -> bool {
        self.0.value.borrow().is_none()
    }

    /// True if both handles point at the same node.
    pub fn same_node(&self, other: &NodeRef<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrows the value stored at this node.
    ///
    /// # Panics
    ///
    /// Panics if called on a sentinel (head/tail) node.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let borrow = self.0.value.borrow();
        f(borrow.as_ref().expect("sentinel node has no value"))
    }

    /// Mutably borrows the value stored at this node.
    ///
    /// # Panics
    ///
    /// Panics if called on a sentinel (head/tail) node.
    pub fn with_value_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut borrow = self.0.value.borrow_mut();
        f(borrow.as_mut().expect("sentinel node has no value"))
    }

    /// Replaces the value stored at this node, returning the old value.
    ///
    /// # Panics
    ///
    /// Panics if called on a sentinel (head/tail) node.
    pub fn replace_value(&self, new: T) -> T {
        self.0
            .value
            .borrow_mut()
            .replace(new)
            .expect("sentinel node has no value")
    }

    /// Returns the next node, or `None` if this is the tail sentinel.
    pub fn next(&self) -> Option<NodeRef<T>> {
        self.0
            .next
            .borrow()
            .as_ref()
            .filter(|n| n.value.borrow().is_some())
            .map(|n| NodeRef(n.clone()))
    }

    /// Returns the previous node, or `None` if this is the head sentinel.
    pub fn prev(&self) -> Option<NodeRef<T>> {
        self.0
            .prev
            .borrow()
            .upgrade()
            .filter(|n| n.value.borrow().is_some())
            .map(NodeRef)
    }
}

/// A doubly linked list with sentinel head and tail nodes.
pub struct List<T> {
    head: Rc<Node<T>>,
    tail: Rc<Node<T>>,
    len: usize,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> List<T> {
    /// Creates a new, empty list.
    pub fn new() -> Self {
        let head = Rc::new(Node {
            value: RefCell::new(None),
            prev: RefCell::new(Weak::new()),
            next: RefCell::new(None),
        });
        let tail = Rc::new(Node {
            value: RefCell::new(None),
            prev: RefCell::new(Rc::downgrade(&head)),
            next: RefCell::new(None),
        });
        *head.next.borrow_mut() = Some(tail.clone());
        Self { head, tail, len: 0 }
    }

    /// Number of non-sentinel nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the list holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the first node, if any.
    pub fn front(&self) -> Option<NodeRef<T>> {
        NodeRef(self.head.clone()).next()
    }

    /// Returns the last node, if any.
    pub fn back(&self) -> Option<NodeRef<T>> {
        NodeRef(self.tail.clone()).prev()
    }

    /// Appends a value at the end of the list.
    pub fn push_back(&mut self, value: T) -> NodeRef<T> {
        let before = self.tail.clone();
        self.insert_before_raw(&before, value)
    }

    /// Prepends a value at the front of the list.
    pub fn push_front(&mut self, value: T) -> NodeRef<T> {
        match self.front() {
            Some(f) => self.insert_before(&f, value),
            None => self.push_back(value),
        }
    }

    /// Inserts `value` immediately before `at`.
    pub fn insert_before(&mut self, at: &NodeRef<T>, value: T) -> NodeRef<T> {
        self.insert_before_raw(&at.0, value)
    }

    /// Inserts `value` immediately after `at`.
    pub fn insert_after(&mut self, at: &NodeRef<T>, value: T) -> NodeRef<T> {
        match at.next() {
            Some(next) => self.insert_before(&next, value),
            None => self.push_back(value),
        }
    }

    fn insert_before_raw(&mut self, before: &Rc<Node<T>>, value: T) -> NodeRef<T> {
        let prev = before
            .prev
            .borrow()
            .upgrade()
            .expect("node has a live predecessor (sentinel keeps head alive)");
        let node = Rc::new(Node {
            value: RefCell::new(Some(value)),
            prev: RefCell::new(Rc::downgrade(&prev)),
            next: RefCell::new(Some(before.clone())),
        });
        *prev.next.borrow_mut() = Some(node.clone());
        *before.prev.borrow_mut() = Rc::downgrade(&node);
        self.len += 1;
        NodeRef(node)
    }

    /// Removes a single node from the list and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if `node` is a sentinel, or if other `NodeRef` handles to it
    /// are still alive.
    pub fn unlink(&mut self, node: NodeRef<T>) -> T {
        assert!(!node.is_sentinel(), "cannot unlink a sentinel node");
        let prev = node
            .0
            .prev
            .borrow()
            .upgrade()
            .expect("non-sentinel node always has a predecessor");
        let next = node
            .0
            .next
            .borrow()
            .clone()
            .expect("non-sentinel node always has a successor");
        *prev.next.borrow_mut() = Some(next.clone());
        *next.prev.borrow_mut() = Rc::downgrade(&prev);
        self.len -= 1;

        let node = Rc::try_unwrap(node.0)
            .unwrap_or_else(|_| panic!("dangling reference to unlinked node"));
        node.value.into_inner().expect("checked non-sentinel above")
    }

    /// Detaches the inclusive run of nodes `[first, last]` from this list and
    /// returns it as a standalone list whose own sentinels bound exactly
    /// that run, in the same relative order.
    ///
    /// `first` and `last` may be the same node. This is an O(1) splice.
    pub fn detach_chain(&mut self, first: NodeRef<T>, last: NodeRef<T>) -> List<T> {
        let mut removed_len = 1;
        let mut cursor = first.clone();
        while !cursor.same_node(&last) {
            cursor = cursor
                .next()
                .expect("last is reachable from first within this list");
            removed_len += 1;
        }

        let before = first
            .0
            .prev
            .borrow()
            .upgrade()
            .expect("chain start has a predecessor");
        let after = last
            .0
            .next
            .borrow()
            .clone()
            .expect("chain end has a successor");

        // Splice the main list across the gap.
        *before.next.borrow_mut() = Some(after.clone());
        *after.prev.borrow_mut() = Rc::downgrade(&before);
        self.len -= removed_len;

        // Build the detached list with fresh sentinels bounding the chain.
        let mut detached = List::new();
        *detached.head.next.borrow_mut() = Some(first.0.clone());
        *first.0.prev.borrow_mut() = Rc::downgrade(&detached.head);
        *detached.tail.prev.borrow_mut() = Rc::downgrade(&last.0);
        *last.0.next.borrow_mut() = Some(detached.tail.clone());
        detached.len = removed_len;
        detached
    }

    /// Forward iterator over node handles.
    pub fn iter_nodes(&self) -> NodeIter<T> {
        NodeIter {
            next: self.front(),
        }
    }
}

/// Forward iterator over the nodes of a [`List`].
pub struct NodeIter<T> {
    next: Option<NodeRef<T>>,
}

impl<T> Iterator for NodeIter<T> {
    type Item = NodeRef<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.next();
        Some(current)
    }
}
