//! Detection of non-matching elements across patch interfaces.
//!
//! Two hierarchical trees meet along an interface. Wherever a region of one
//! tree touches the interface at a finer level than the facing region of the
//! other, the coarser side has to be refined for the meshes to match. The
//! functions here only *detect* the mismatches and return the refinement
//! boxes for both sides; applying them is up to the caller (see
//! [`crate::multibasis::MultiBasis::repair_interface`]).

use crate::htree::{shift_index, ElementBox, HierarchicalTree};
use crate::topology::PatchInterface;
use eyre::{bail, ensure};
use itertools::iproduct;

// A box of the merged interface mesh: the overlap of one side-box from each
// tree, with the corner coordinates along the interface directions expressed
// at the common index level, plus the refinement levels of both contributors.
struct MergedBox {
    lower: [u64; 2],
    upper: [u64; 2],
    level0: u8,
    level1: u8,
}

/// Finds the elements on both sides of an interface that have to be refined
/// for the two meshes to match, for `d` equal to 2 or 3.
///
/// The returned boxes are expressed in each tree's own direction frame and
/// level-tagged, ready to be passed to `refine_elements` of the respective
/// basis. Both lists are empty exactly when the interface already matches.
///
/// The algorithm compares all pairs of boundary boxes, which is simple and
/// robust but quadratic in the number of boxes per side; for 2D interfaces
/// [`find_mismatched_elements_2d`] merges sorted knot spans instead.
pub fn find_mismatched_elements(
    bi: &PatchInterface,
    tree0: &HierarchicalTree,
    tree1: &HierarchicalTree,
) -> eyre::Result<(Vec<ElementBox>, Vec<ElementBox>)> {
    let d = tree0.dim();
    ensure!(d == 2 || d == 3, "interface repair requires dimension 2 or 3");
    ensure!(
        tree1.dim() == d,
        "trees on the two sides of the interface have different dimensions"
    );
    ensure!(
        bi.dir_map().len() == d,
        "interface direction map does not match the tree dimension"
    );

    let dir_map = bi.dir_map();
    let dir_orient = bi.dir_orientation();

    // All index computations happen at the finer of the two index levels
    let index_level_use = tree0.index_level().max(tree1.index_level());
    let upper0 = tree0.upper_corner_at(index_level_use);
    let upper1 = tree1.upper_corner_at(index_level_use);

    let c0 = bi.first().side.direction();
    let c1 = dir_map[c0];
    for jj in 0..d {
        if jj != c0 {
            ensure!(
                upper0[jj] == upper1[dir_map[jj]],
                "meshes on the interface do not match: extents {} and {} \
                 in paired directions {} and {}",
                upper0[jj],
                upper1[dir_map[jj]],
                jj,
                dir_map[jj]
            );
        }
    }

    // Boundary boxes of the first tree, shifted to the common index level
    let exp0 = index_level_use - tree0.max_inserted_level();
    let boxes0: Vec<(Vec<u64>, Vec<u64>, u8)> = tree0
        .boxes_on_side(bi.first().side)
        .into_iter()
        .map(|b| {
            (
                b.lower.iter().map(|&c| c << exp0).collect(),
                b.upper.iter().map(|&c| c << exp0).collect(),
                b.level,
            )
        })
        .collect();

    // Boundary boxes of the second tree, shifted likewise; directions with
    // reversed orientation are flipped so that coordinates along the
    // interface increase consistently on both sides
    let exp1 = index_level_use - tree1.max_inserted_level();
    let boxes1: Vec<(Vec<u64>, Vec<u64>, u8)> = tree1
        .boxes_on_side(bi.second().side)
        .into_iter()
        .map(|b| {
            let mut lo: Vec<u64> = b.lower.iter().map(|&c| c << exp1).collect();
            let mut up: Vec<u64> = b.upper.iter().map(|&c| c << exp1).collect();
            for jj in 0..d {
                let j = dir_map[jj];
                if !dir_orient[jj] {
                    let tmp = upper1[j] - lo[j];
                    lo[j] = upper1[j] - up[j];
                    up[j] = tmp;
                }
            }
            (lo, up, b.level)
        })
        .collect();

    // The directions a, b span the interface; c is the normal. In 2D there is
    // only one tangential direction, so b repeats a (harmless duplicate tests)
    let a0 = if c0 == 0 { 1 } else { 0 };
    let b0 = if d == 2 {
        a0
    } else if c0 == 2 {
        1
    } else {
        2
    };
    let a1 = dir_map[a0];
    let b1 = dir_map[b0];

    let mut merged = Vec::new();
    for ((lo0, up0, level0), (lo1, up1, level1)) in iproduct!(&boxes0, &boxes1) {
        if lo0[a0] < up1[a1] && lo0[b0] < up1[b1] && lo1[a1] < up0[a0] && lo1[b1] < up0[b0] {
            merged.push(MergedBox {
                lower: [lo0[a0].max(lo1[a1]), lo0[b0].max(lo1[b1])],
                upper: [up0[a0].min(up1[a1]), up0[b0].min(up1[b1])],
                level0: *level0,
                level1: *level1,
            });
        }
    }

    let mut elts_first = Vec::new();
    let mut elts_second = Vec::new();
    for m in &merged {
        if m.level0 == m.level1 {
            continue;
        }
        let refine_first = m.level0 < m.level1;
        let (level_use, a, b, c, side, upper) = if refine_first {
            (m.level1, a0, b0, c0, bi.first().side, &upper0)
        } else {
            (m.level0, a1, b1, c1, bi.second().side, &upper1)
        };
        let upper_corner_on_level = shift_index(upper[c], index_level_use, level_use);

        let mut lower = vec![0u64; d];
        let mut upper_box = vec![0u64; d];
        lower[a] = shift_index(m.lower[0], index_level_use, level_use);
        upper_box[a] = shift_index(m.upper[0], index_level_use, level_use);
        if d == 3 {
            lower[b] = shift_index(m.lower[1], index_level_use, level_use);
            upper_box[b] = shift_index(m.upper[1], index_level_use, level_use);
        }
        if side.index() % 2 == 1 {
            // west, south, front
            lower[c] = 0;
            upper_box[c] = 1;
        } else {
            // east, north, back
            lower[c] = upper_corner_on_level - 1;
            upper_box[c] = upper_corner_on_level;
        }

        if refine_first {
            elts_first.push(ElementBox::new(level_use, lower, upper_box));
        } else {
            // Undo the orientation flips for the second tree's own frame
            for jj in 0..d {
                let j = dir_map[jj];
                if j != c && !dir_orient[jj] {
                    let uc = shift_index(upper1[j], index_level_use, level_use);
                    let tmp = lower[j];
                    lower[j] = uc - upper_box[j];
                    upper_box[j] = uc - tmp;
                }
            }
            elts_second.push(ElementBox::new(level_use, lower, upper_box));
        }
    }

    Ok((elts_first, elts_second))
}

/// Finds the mismatched elements of a 2D interface by a three-way merge of
/// the sorted knot spans of both sides.
///
/// Behaves like [`find_mismatched_elements`] but runs in linear time in the
/// number of boundary boxes. Only available in 2D.
pub fn find_mismatched_elements_2d(
    bi: &PatchInterface,
    tree0: &HierarchicalTree,
    tree1: &HierarchicalTree,
) -> eyre::Result<(Vec<ElementBox>, Vec<ElementBox>)> {
    let d = tree0.dim();
    if d != 2 {
        bail!("knot-span merging repair is not implemented for 3D interfaces");
    }
    ensure!(
        tree1.dim() == d,
        "trees on the two sides of the interface have different dimensions"
    );
    ensure!(
        bi.dir_map().len() == d,
        "interface direction map does not match the tree dimension"
    );

    let index_level_use = tree0.index_level().max(tree1.index_level());
    let upper0 = tree0.upper_corner_at(index_level_use);
    let upper1 = tree1.upper_corner_at(index_level_use);

    // The single tangential direction on each side
    let dir0 = (bi.first().side.direction() + 1) % 2;
    let dir1 = (bi.second().side.direction() + 1) % 2;
    let orient_preserved = bi.dir_orientation()[dir0];

    // Knot spans (start, end, level) of both sides at the common index level
    let exp0 = index_level_use - tree0.max_inserted_level();
    let mut intfc0: Vec<(u64, u64, u8)> = tree0
        .boxes_on_side(bi.first().side)
        .into_iter()
        .map(|b| (b.lower[dir0] << exp0, b.upper[dir0] << exp0, b.level))
        .collect();
    intfc0.sort();

    let exp1 = index_level_use - tree1.max_inserted_level();
    let mut intfc1: Vec<(u64, u64, u8)> = tree1
        .boxes_on_side(bi.second().side)
        .into_iter()
        .map(|b| {
            let (lo, up) = (b.lower[dir1] << exp1, b.upper[dir1] << exp1);
            if orient_preserved {
                (lo, up, b.level)
            } else {
                (upper1[dir1] - up, upper1[dir1] - lo, b.level)
            }
        })
        .collect();
    intfc1.sort();

    ensure!(
        !intfc0.is_empty() && !intfc1.is_empty(),
        "interface has no boundary boxes"
    );
    ensure!(
        intfc0.last().unwrap().1 == intfc1.last().unwrap().1,
        "meshes on the interface do not match: the sides span different extents"
    );

    // Merge into segments (end knot, level on first, level on second)
    let mut segments: Vec<(u64, u8, u8)> = Vec::new();
    let (mut i0, mut i1) = (0, 0);
    while i0 < intfc0.len() && i1 < intfc1.len() {
        let end0 = intfc0[i0].1;
        let end1 = intfc1[i1].1;
        let levels = (intfc0[i0].2, intfc1[i1].2);
        if end0 == end1 {
            segments.push((end0, levels.0, levels.1));
            i0 += 1;
            i1 += 1;
        } else if end0 > end1 {
            segments.push((end1, levels.0, levels.1));
            i1 += 1;
        } else {
            segments.push((end0, levels.0, levels.1));
            i0 += 1;
        }
    }

    let mut elts_first = Vec::new();
    let mut elts_second = Vec::new();
    let mut knot1 = 0u64;
    for &(end, level0, level1) in &segments {
        let knot0 = knot1;
        knot1 = end;

        if level0 < level1 {
            // Knot indices on level `level1`
            let k0 = shift_index(knot0, index_level_use, level1);
            let k1 = shift_index(knot1, index_level_use, level1);
            elts_first.push(side_segment_box(
                bi.first().side.index(),
                level1,
                k0,
                k1,
                &upper0,
                index_level_use,
            )?);
        } else if level0 > level1 {
            // Flip back into the second tree's own numbering, then push the
            // knot indices down to level `level0`
            let (f0, f1) = if orient_preserved {
                (knot0, knot1)
            } else {
                (upper1[dir1] - knot1, upper1[dir1] - knot0)
            };
            let k0 = shift_index(f0, index_level_use, level0);
            let k1 = shift_index(f1, index_level_use, level0);
            elts_second.push(side_segment_box(
                bi.second().side.index(),
                level0,
                k0,
                k1,
                &upper1,
                index_level_use,
            )?);
        }
    }

    Ok((elts_first, elts_second))
}

// The refinement box of one mismatched knot segment: one cell deep in the
// normal direction, spanning [knot0, knot1] tangentially.
fn side_segment_box(
    side_index: usize,
    level: u8,
    knot0: u64,
    knot1: u64,
    upper: &[u64],
    index_level_use: u8,
) -> eyre::Result<ElementBox> {
    let b = match side_index {
        // west
        1 => ElementBox::new(level, vec![0, knot0], vec![1, knot1]),
        // east
        2 => {
            let uc = shift_index(upper[0], index_level_use, level);
            ElementBox::new(level, vec![uc - 1, knot0], vec![uc, knot1])
        }
        // south
        3 => ElementBox::new(level, vec![knot0, 0], vec![knot1, 1]),
        // north
        4 => {
            let uc = shift_index(upper[1], index_level_use, level);
            ElementBox::new(level, vec![knot0, uc - 1], vec![knot1, uc])
        }
        _ => bail!("knot-span merging repair is not implemented for 3D interfaces"),
    };
    Ok(b)
}
