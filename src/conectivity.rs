use crate::arrays::{Array2D, LabelMap};
use assume::assume;

/// Connected components of a flattened `DisjointSet`, numbered in raster order of their
/// first pixel.
#[derive(Debug)]
pub struct ComponentSet {
    pub num_components: u32,
    /// Component of every pixel.
    pub component_assignment: Vec<u32>,
    pub num_component_members: Vec<u32>,
    /// Index of the first pixel (in raster order) of every component.
    pub component_leaders: Vec<u32>,
}

/// Union-find over pixel indices. The root of every set is its smallest index.
pub struct DisjointSet {
    parents: Vec<u32>,
}

impl DisjointSet {
    pub fn new(size: u32) -> Self {
        assert!(size > 0, "Size must be larger than zero.");
        assert!(size < u32::MAX, "Size must be smaller than {}", u32::MAX);
        DisjointSet {
            parents: (0..size).collect(),
        }
    }

    #[inline]
    pub fn find(&mut self, node: u32) -> u32 {
        let mut node = node as usize;
        loop {
            let parent = self.parents[node] as usize;
            assume!(unsafe: parent < self.parents.len(), "parent: {parent} > {}", self.parents.len());
            if parent == node {
                return node as u32;
            }
            // path halving
            let grandparent = self.parents[parent];
            self.parents[node] = grandparent;
            node = grandparent as usize;
        }
    }

    #[inline]
    pub fn merge(&mut self, node_i: u32, node_j: u32) {
        let root_i = self.find(node_i);
        let root_j = self.find(node_j);
        if root_i < root_j {
            self.parents[root_j as usize] = root_i;
        } else if root_j < root_i {
            self.parents[root_i as usize] = root_j;
        }
    }

    pub fn flatten(mut self) -> ComponentSet {
        let len = self.parents.len();
        let mut result = ComponentSet {
            num_components: 0,
            component_assignment: vec![u32::MAX; len],
            num_component_members: vec![],
            component_leaders: vec![],
        };
        for i in 0..len {
            let root = self.find(i as u32) as usize;
            let component_no = if root == i {
                result.component_leaders.push(i as u32);
                result.num_component_members.push(0);
                result.num_components += 1;
                result.num_components - 1
            } else {
                // the root is smaller, so it is numbered already
                debug_assert!(root < i);
                result.component_assignment[root]
            };
            result.component_assignment[i] = component_no;
            result.num_component_members[component_no as usize] += 1;
        }
        result
    }
}

/// Builds the 4-connected components of equal assignment.
pub fn assign_disjoint_set(assignments: &Array2D<u32>) -> DisjointSet {
    let width = assignments.width;
    let mut cc_set = DisjointSet::new(assignments.data.len() as u32);
    for row_num in 0..assignments.height {
        let row = assignments.get_row(row_num);
        let row_index = (width * row_num) as u32;
        for column_num in 0..width {
            let index = row_index + column_num as u32;
            if column_num > 0 && row[column_num - 1] == row[column_num] {
                cc_set.merge(index - 1, index);
            }
            if row_num > 0 && assignments.data[index as usize - width] == row[column_num] {
                cc_set.merge(index - width as u32, index);
            }
        }
    }
    cc_set
}

/// This function implements the CCA step.
///
/// Every 4-connected component with fewer than `min_size` pixels is merged into the segment of
/// the pixel left of (or, at the first column, above) its first pixel. The component holding
/// pixel (0, 0) is always kept. Surviving components are labelled `0..N` in raster order of
/// their first pixel, so each label is exactly one 4-connected region.
///
/// Writes the labels into `labels` (resized to the assignment size) and returns `N`.
pub fn enforce_connectivity(assignments: &Array2D<u32>, min_size: u32, labels: &mut LabelMap) -> u32 {
    let width = assignments.width;
    let cc_set = assign_disjoint_set(assignments).flatten();

    let num_components = cc_set.num_components as usize;
    let mut substitute = vec![u32::MAX; num_components];
    let mut next_label = 0u32;
    // components are numbered by their leaders, so every neighbour we look at is resolved
    for component_no in 0..num_components {
        if component_no == 0 || cc_set.num_component_members[component_no] >= min_size {
            substitute[component_no] = next_label;
            next_label += 1;
            continue;
        }
        let leader_index = cc_set.component_leaders[component_no] as usize;
        let neighbour = if leader_index % width > 0 {
            leader_index - 1
        } else {
            leader_index - width
        };
        let subs_label = substitute[cc_set.component_assignment[neighbour] as usize];
        debug_assert!(subs_label != u32::MAX, "leader {leader_index}");
        substitute[component_no] = subs_label;
    }

    // Relabeling
    labels.reset(assignments.width, assignments.height, 0);
    for (i, label) in labels.data.iter_mut().enumerate() {
        assume!(unsafe: i < cc_set.component_assignment.len(), "i: {i} > {}", cc_set.component_assignment.len());
        let component_no = cc_set.component_assignment[i] as usize;
        assume!(unsafe: component_no < substitute.len(), "i: {i}, component: {component_no} > {}", substitute.len());
        *label = substitute[component_no] as i32;
    }
    next_label
}
