//! 拆分标签重组：把同一拆分方式下的前缀与后缀片段按位置配对。

use std::cmp::Ordering;

use pidlabel_core::document::EntityId;
use tracing::debug;

use crate::classify::{LabelCandidate, Orientation};

/// 重组后的一个物理标签。
#[derive(Debug, Clone, PartialEq)]
pub enum ReassembledLabel {
    Single(LabelCandidate),
    Pair {
        prefix: LabelCandidate,
        suffix: LabelCandidate,
    },
}

impl ReassembledLabel {
    /// 按输出顺序返回组成片段。
    pub fn fragments(&self) -> Vec<&LabelCandidate> {
        match self {
            ReassembledLabel::Single(candidate) => vec![candidate],
            ReassembledLabel::Pair { prefix, suffix } => vec![prefix, suffix],
        }
    }

    /// 组成片段的来源（实体与属性序号），用于跨分组去重。
    pub fn sources(&self) -> Vec<(EntityId, Option<usize>)> {
        self.fragments()
            .into_iter()
            .map(|candidate| (candidate.entity, candidate.attribute_index))
            .collect()
    }

    /// 首个片段，决定图框边缘过滤。
    pub fn lead(&self) -> &LabelCandidate {
        match self {
            ReassembledLabel::Single(candidate) => candidate,
            ReassembledLabel::Pair { prefix, .. } => prefix,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reassembly {
    pub labels: Vec<ReassembledLabel>,
    /// 未能配对的片段，不输出但计入复核。
    pub leftovers: Vec<LabelCandidate>,
}

impl Reassembly {
    #[inline]
    pub fn has_leftovers(&self) -> bool {
        !self.leftovers.is_empty()
    }
}

/// 按旋转类别分别配对，水平组在前。歧义角度的片段并入最近的名义方向。
pub fn reassemble(prefixes: &[LabelCandidate], suffixes: &[LabelCandidate]) -> Reassembly {
    let mut result = Reassembly::default();
    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        let mut heads = of_orientation(prefixes, orientation);
        let mut tails = of_orientation(suffixes, orientation);
        if heads.is_empty() && tails.is_empty() {
            continue;
        }
        sort_positional(&mut heads, orientation);
        sort_positional(&mut tails, orientation);

        let shared = heads
            .iter()
            .any(|head| tails.iter().any(|tail| same_source(head, tail)));
        if heads.len() == tails.len() && !shared {
            result.labels.extend(heads.into_iter().zip(tails).map(|(prefix, suffix)| {
                ReassembledLabel::Pair {
                    prefix: prefix.clone(),
                    suffix: suffix.clone(),
                }
            }));
        } else {
            debug!(
                ?orientation,
                prefixes = heads.len(),
                suffixes = tails.len(),
                "前后缀数量不一致，按位置顺序配对"
            );
            walk_slots(merge_slots(heads, tails, orientation), &mut result);
        }
    }
    result
}

fn of_orientation(
    candidates: &[LabelCandidate],
    orientation: Orientation,
) -> Vec<&LabelCandidate> {
    candidates
        .iter()
        .filter(|candidate| candidate.orientation() == orientation)
        .collect()
}

fn positional_order(a: &LabelCandidate, b: &LabelCandidate, orientation: Orientation) -> Ordering {
    let (a_major, a_minor, b_major, b_minor) = match orientation {
        Orientation::Horizontal => (a.position.x(), a.position.y(), b.position.x(), b.position.y()),
        Orientation::Vertical => (a.position.y(), a.position.x(), b.position.y(), b.position.x()),
    };
    a_major
        .total_cmp(&b_major)
        .then(a_minor.total_cmp(&b_minor))
        .then_with(|| a.raw_text.cmp(&b.raw_text))
        .then(a.entity.cmp(&b.entity))
        .then(a.attribute_index.cmp(&b.attribute_index))
}

fn sort_positional(candidates: &mut [&LabelCandidate], orientation: Orientation) {
    candidates.sort_by(|a, b| positional_order(a, b, orientation));
}

#[inline]
fn same_source(a: &LabelCandidate, b: &LabelCandidate) -> bool {
    a.entity == b.entity && a.attribute_index == b.attribute_index
}

/// 合并后序列中的一个位置；同一实体同时满足前后缀时只占一个位置。
struct Slot<'a> {
    as_prefix: Option<&'a LabelCandidate>,
    as_suffix: Option<&'a LabelCandidate>,
}

impl<'a> Slot<'a> {
    fn any(&self) -> Option<&'a LabelCandidate> {
        self.as_prefix.or(self.as_suffix)
    }

    fn text_len(&self) -> usize {
        self.any().map_or(0, |candidate| candidate.text.chars().count())
    }

    fn is_dual(&self) -> bool {
        self.as_prefix.is_some() && self.as_suffix.is_some()
    }
}

fn merge_slots<'a>(
    heads: Vec<&'a LabelCandidate>,
    tails: Vec<&'a LabelCandidate>,
    orientation: Orientation,
) -> Vec<Slot<'a>> {
    let mut slots: Vec<Slot<'a>> = heads
        .into_iter()
        .map(|head| Slot {
            as_prefix: Some(head),
            as_suffix: None,
        })
        .collect();
    for tail in tails {
        match slots
            .iter_mut()
            .find(|slot| slot.as_prefix.is_some_and(|head| same_source(head, tail)))
        {
            Some(slot) => slot.as_suffix = Some(tail),
            None => slots.push(Slot {
                as_prefix: None,
                as_suffix: Some(tail),
            }),
        }
    }
    slots.sort_by(|a, b| match (a.any(), b.any()) {
        (Some(a), Some(b)) => positional_order(a, b, orientation),
        _ => Ordering::Equal,
    });
    slots
}

/// 逐位置推进：相邻的（前缀，后缀）成对，否则当前位置失配并后移一位。
/// 后缀排在前缀之前时（上下叠放或插入点偏移），文字更长的一方作为前缀交换配对。
fn walk_slots(slots: Vec<Slot<'_>>, result: &mut Reassembly) {
    let mut index = 0;
    while index < slots.len() {
        let current = &slots[index];
        let Some(next) = slots.get(index + 1) else {
            result.leftovers.extend(current.any().cloned());
            break;
        };

        let forward = current.as_prefix.zip(next.as_suffix);
        let backward = current
            .as_suffix
            .zip(next.as_prefix)
            .filter(|_| next.text_len() > current.text_len())
            .map(|(suffix, prefix)| (prefix, suffix));
        let pair = match (forward, backward) {
            (Some(_), Some(swapped)) if current.is_dual() || next.is_dual() => Some(swapped),
            (Some(forward), _) => Some(forward),
            (None, swapped) => swapped,
        };

        match pair {
            Some((prefix, suffix)) => {
                result.labels.push(ReassembledLabel::Pair {
                    prefix: prefix.clone(),
                    suffix: suffix.clone(),
                });
                index += 2;
            }
            None => {
                result.leftovers.extend(current.any().cloned());
                index += 1;
            }
        }
    }
}
