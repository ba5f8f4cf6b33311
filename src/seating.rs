use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Class numbers this policy knows about. Requests outside the range are
/// rejected, never bucketed by a fallback.
pub const MIN_CLASS: u32 = 1;
pub const MAX_CLASS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Middle,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Middle => "middle",
            Side::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s {
            "left" => Some(Side::Left),
            "middle" => Some(Side::Middle),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

/// Room-capacity class tag. Rooms declare which bucket of classes they may
/// host; `All` is the catch-all that matches every class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBucket {
    Xs,
    S,
    M,
    L,
    Xl,
    Xxl,
    All,
}

impl SizeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Xs => "XS",
            SizeBucket::S => "S",
            SizeBucket::M => "M",
            SizeBucket::L => "L",
            SizeBucket::Xl => "XL",
            SizeBucket::Xxl => "XXL",
            SizeBucket::All => "ALL",
        }
    }

    pub fn parse(s: &str) -> Option<SizeBucket> {
        match s.to_ascii_uppercase().as_str() {
            "XS" => Some(SizeBucket::Xs),
            "S" => Some(SizeBucket::S),
            "M" => Some(SizeBucket::M),
            "L" => Some(SizeBucket::L),
            "XL" => Some(SizeBucket::Xl),
            "XXL" => Some(SizeBucket::Xxl),
            "ALL" => Some(SizeBucket::All),
            _ => None,
        }
    }
}

struct BucketRange {
    lo: u32,
    hi: u32,
    bucket: SizeBucket,
}

/// Range -> bucket records rather than inline branching so the partition
/// invariant can be checked by `verify_tables` and the policy swapped for a
/// different school configuration.
const BUCKET_TABLE: &[BucketRange] = &[
    BucketRange { lo: 1, hi: 2, bucket: SizeBucket::Xs },
    BucketRange { lo: 3, hi: 4, bucket: SizeBucket::S },
    BucketRange { lo: 5, hi: 6, bucket: SizeBucket::M },
    BucketRange { lo: 7, hi: 8, bucket: SizeBucket::L },
    BucketRange { lo: 9, hi: 10, bucket: SizeBucket::Xl },
    BucketRange { lo: 11, hi: 12, bucket: SizeBucket::Xxl },
];

/// Classes permitted to share the same physical rooms on an exam day.
/// Members must be listed in ascending order.
const SHARED_GROUPS: &[&[u32]] = &[
    &[1, 2],
    &[3, 4],
    &[5, 6],
    &[7, 8],
    &[9, 10],
    &[11, 12],
];

pub fn size_bucket(class_number: u32) -> Result<SizeBucket, SeatingError> {
    BUCKET_TABLE
        .iter()
        .find(|r| r.lo <= class_number && class_number <= r.hi)
        .map(|r| r.bucket)
        .ok_or(SeatingError::UnsupportedClass { class_number })
}

pub fn shared_group(class_number: u32) -> Result<&'static [u32], SeatingError> {
    SHARED_GROUPS
        .iter()
        .find(|g| g.contains(&class_number))
        .copied()
        .ok_or(SeatingError::UnsupportedClass { class_number })
}

/// Startup self-check: the bucket ranges and shared groups must partition
/// the class domain, and no group may exceed two members. The side policy
/// for larger groups is deliberately undefined; extending a group past two
/// classes requires choosing one here first.
pub fn verify_tables() -> anyhow::Result<()> {
    for n in MIN_CLASS..=MAX_CLASS {
        let buckets = BUCKET_TABLE
            .iter()
            .filter(|r| r.lo <= n && n <= r.hi)
            .count();
        if buckets != 1 {
            anyhow::bail!("class {} matches {} bucket ranges, expected 1", n, buckets);
        }
        let groups = SHARED_GROUPS.iter().filter(|g| g.contains(&n)).count();
        if groups != 1 {
            anyhow::bail!("class {} appears in {} shared groups, expected 1", n, groups);
        }
    }
    for g in SHARED_GROUPS {
        if g.is_empty() || g.len() > 2 {
            anyhow::bail!("shared group {:?} has unsupported size {}", g, g.len());
        }
        if !g.windows(2).all(|w| w[0] < w[1]) {
            anyhow::bail!("shared group {:?} is not ascending", g);
        }
        if g.iter().any(|n| *n < MIN_CLASS || *n > MAX_CLASS) {
            anyhow::bail!("shared group {:?} leaves the class domain", g);
        }
    }
    Ok(())
}

fn side_in_group(class_number: u32, group: &[u32]) -> Side {
    if group.len() == 1 {
        return Side::Middle;
    }
    let smallest = *group.iter().min().unwrap_or(&class_number);
    if class_number == smallest {
        Side::Left
    } else {
        Side::Right
    }
}

/// Which half of the bench a class occupies, fixed once per class: the
/// smaller class number of a pair sits left, the larger right, a class
/// that shares with nobody sits middle.
pub fn position_in_room(class_number: u32) -> Result<Side, SeatingError> {
    let group = shared_group(class_number)?;
    Ok(side_in_group(class_number, group))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRow {
    pub row_number: u32,
    pub bench_count: u32,
}

/// Physical shape of a room: ordered rows, each with a bench count.
/// Immutable once built; an exam day's plan assumes it does not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLayout {
    rows: Vec<LayoutRow>,
}

impl RoomLayout {
    pub fn new(rows: Vec<LayoutRow>) -> Result<RoomLayout, SeatingError> {
        if rows.is_empty() {
            return Err(SeatingError::InvalidLayout {
                reason: "layout must have at least one row".to_string(),
            });
        }
        if rows[0].row_number == 0 {
            return Err(SeatingError::InvalidLayout {
                reason: "row numbers start at 1".to_string(),
            });
        }
        if !rows.windows(2).all(|w| w[0].row_number < w[1].row_number) {
            return Err(SeatingError::InvalidLayout {
                reason: "row numbers must be strictly increasing".to_string(),
            });
        }
        Ok(RoomLayout { rows })
    }

    pub fn rows(&self) -> &[LayoutRow] {
        &self.rows
    }

    pub fn capacity(&self) -> u32 {
        self.rows.iter().map(|r| r.bench_count).sum()
    }
}

pub struct RoomInfo {
    pub room_id: String,
    pub bucket: SizeBucket,
    pub layout: RoomLayout,
}

/// The rooms a bucket may draw on: exact matches plus the catch-all.
pub fn matching_rooms(bucket: SizeBucket, rooms: &[RoomInfo]) -> Vec<&RoomInfo> {
    rooms
        .iter()
        .filter(|r| r.bucket == bucket || r.bucket == SizeBucket::All)
        .collect()
}

/// Total bench count across the rooms a class may use. The caller supplies
/// rooms already filtered to active; order does not matter.
pub fn total_capacity(bucket: SizeBucket, rooms: &[RoomInfo]) -> u32 {
    matching_rooms(bucket, rooms)
        .iter()
        .map(|r| r.layout.capacity())
        .sum()
}

/// An exam already admitted for a sibling class on the same type+date.
#[derive(Debug, Clone, Copy)]
pub struct SiblingExam {
    pub class_number: u32,
    pub bench_capacity: u32,
    pub student_count: u32,
}

/// Seats already committed to the other classes in the shared group.
/// Every sibling must have been admitted with the same students-per-bench
/// value; a divergent sibling fails the whole request so the operator can
/// align on one value.
pub fn occupied_capacity(
    class_number: u32,
    bench_capacity: u32,
    siblings: &[SiblingExam],
) -> Result<u32, SeatingError> {
    let group = shared_group(class_number)?;
    let mut occupied: u32 = 0;
    for sib in siblings {
        if sib.class_number == class_number || !group.contains(&sib.class_number) {
            continue;
        }
        if sib.bench_capacity != bench_capacity {
            return Err(SeatingError::BenchCapacityMismatch {
                requested: bench_capacity,
                committed: sib.bench_capacity,
            });
        }
        occupied += sib.student_count;
    }
    Ok(occupied)
}

/// A bench capacity of N only makes sense when at most N classes share each
/// bench. Checked before any capacity math runs.
pub fn check_bench_capacity(class_number: u32, bench_capacity: u32) -> Result<(), SeatingError> {
    let group = shared_group(class_number)?;
    if bench_capacity as usize > group.len() {
        return Err(SeatingError::BenchCapacityExceedsSharing {
            bench_capacity,
            group_size: group.len() as u32,
        });
    }
    Ok(())
}

/// The full admission rule: occupied + new must fit in benches x capacity.
/// No partial admission, no preemption.
pub fn can_schedule(
    total_benches: u32,
    bench_capacity: u32,
    occupied: u32,
    new_students: u32,
) -> Result<(), SeatingError> {
    let supply = total_benches as u64 * bench_capacity as u64;
    if occupied as u64 + new_students as u64 <= supply {
        Ok(())
    } else {
        Err(SeatingError::InsufficientCapacity {
            total_benches,
            bench_capacity,
            occupied,
            requested: new_students,
        })
    }
}

/// Cursor into a room's bench walk. Generation resumes strictly after this
/// slot; `START` (row 1, bench 0) admits the very first bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResumePoint {
    pub row: u32,
    pub bench: u32,
}

impl ResumePoint {
    pub const START: ResumePoint = ResumePoint { row: 1, bench: 0 };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssignment {
    pub roll_number: u32,
    pub class_label: String,
    pub section_label: String,
    pub row: u32,
    pub bench: u32,
    pub side: Side,
}

/// Walk the layout in row-major order, handing each visited (row, bench)
/// the next unconsumed roll number. Stops when roll numbers run out;
/// returns a short list when the layout runs out first, which the caller
/// treats as "continue into the next room". Never errors on exhaustion —
/// capacity sufficiency was the scheduling gate's job.
pub fn generate(
    layout: &RoomLayout,
    roll_numbers: &[u32],
    side: Side,
    class_label: &str,
    section_label: &str,
    resume_from: ResumePoint,
) -> Vec<SeatAssignment> {
    let mut out = Vec::with_capacity(roll_numbers.len());
    let mut rolls = roll_numbers.iter().copied();
    let mut pending = rolls.next();
    'rows: for row in &layout.rows {
        if pending.is_none() {
            break;
        }
        if row.row_number < resume_from.row {
            continue;
        }
        for bench in 1..=row.bench_count {
            if row.row_number == resume_from.row && bench <= resume_from.bench {
                continue;
            }
            let Some(roll) = pending else { break 'rows };
            out.push(SeatAssignment {
                roll_number: roll,
                class_label: class_label.to_string(),
                section_label: section_label.to_string(),
                row: row.row_number,
                bench,
                side,
            });
            pending = rolls.next();
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    pub class_label: String,
    pub section_label: String,
}

/// All seats committed in one room for one exam date, possibly spanning
/// several classes and sections. Merge never mutates a plan in place; the
/// caller owns the returned value and is responsible for persisting it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSeatPlan {
    pub assignments: Vec<SeatAssignment>,
    pub contributors: Vec<Contributor>,
}

/// Where generation should continue for a (class, side) pair already
/// present in the plan: strictly after its highest (row, bench), row
/// taking priority over bench. A pair with no prior seats starts from the
/// first bench regardless of what other classes occupy — the opposite
/// bench side is a distinct physical slot, not a row-exclusive lane.
pub fn resume_point(plan: &RoomSeatPlan, class_label: &str, side: Side) -> ResumePoint {
    plan.assignments
        .iter()
        .filter(|a| a.class_label == class_label && a.side == side)
        .map(|a| ResumePoint {
            row: a.row,
            bench: a.bench,
        })
        .max()
        .unwrap_or(ResumePoint::START)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatConflict {
    pub row: u32,
    pub bench: u32,
    pub side: Side,
    pub existing_occupant: u32,
    pub incoming_occupant: u32,
}

/// Fold freshly generated entries into a room's plan. Every incoming slot
/// is checked against the occupancy map first; a non-empty collision set
/// rejects the whole merge with every conflict enumerated, and the
/// existing plan is returned to the caller untouched. Re-submitting the
/// same entries after a successful merge therefore fails as a full
/// collision set rather than silently double-seating.
pub fn merge(
    existing: &RoomSeatPlan,
    new_entries: &[SeatAssignment],
) -> Result<RoomSeatPlan, SeatingError> {
    let mut occupancy: HashMap<(u32, u32, Side), u32> = HashMap::new();
    for a in &existing.assignments {
        occupancy.insert((a.row, a.bench, a.side), a.roll_number);
    }

    let mut conflicts: Vec<SeatConflict> = Vec::new();
    for entry in new_entries {
        let key = (entry.row, entry.bench, entry.side);
        match occupancy.get(&key) {
            Some(&occupant) => conflicts.push(SeatConflict {
                row: entry.row,
                bench: entry.bench,
                side: entry.side,
                existing_occupant: occupant,
                incoming_occupant: entry.roll_number,
            }),
            None => {
                occupancy.insert(key, entry.roll_number);
            }
        }
    }
    if !conflicts.is_empty() {
        return Err(SeatingError::SeatingConflict { conflicts });
    }

    let mut merged = existing.clone();
    merged.assignments.extend(new_entries.iter().cloned());
    for entry in new_entries {
        let contributor = Contributor {
            class_label: entry.class_label.clone(),
            section_label: entry.section_label.clone(),
        };
        if !merged.contributors.contains(&contributor) {
            merged.contributors.push(contributor);
        }
    }
    Ok(merged)
}

/// Decision rejections from the seating core. Every variant carries the
/// operands that produced it so the surface layer can render an exact,
/// actionable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatingError {
    UnsupportedClass {
        class_number: u32,
    },
    InvalidLayout {
        reason: String,
    },
    InsufficientCapacity {
        total_benches: u32,
        bench_capacity: u32,
        occupied: u32,
        requested: u32,
    },
    BenchCapacityMismatch {
        requested: u32,
        committed: u32,
    },
    BenchCapacityExceedsSharing {
        bench_capacity: u32,
        group_size: u32,
    },
    SeatingConflict {
        conflicts: Vec<SeatConflict>,
    },
}

impl SeatingError {
    pub fn code(&self) -> &'static str {
        match self {
            SeatingError::UnsupportedClass { .. } => "unsupported_class",
            SeatingError::InvalidLayout { .. } => "invalid_layout",
            SeatingError::InsufficientCapacity { .. } => "insufficient_capacity",
            SeatingError::BenchCapacityMismatch { .. } => "bench_capacity_mismatch",
            SeatingError::BenchCapacityExceedsSharing { .. } => "bench_capacity_exceeds_sharing",
            SeatingError::SeatingConflict { .. } => "seating_conflict",
        }
    }

    pub fn message(&self) -> String {
        match self {
            SeatingError::UnsupportedClass { class_number } => {
                format!(
                    "class {} is outside the supported range {}..={}",
                    class_number, MIN_CLASS, MAX_CLASS
                )
            }
            SeatingError::InvalidLayout { reason } => format!("invalid room layout: {}", reason),
            SeatingError::InsufficientCapacity {
                total_benches,
                bench_capacity,
                occupied,
                requested,
            } => format!(
                "{} occupied + {} requested exceeds {} benches x {} per bench",
                occupied, requested, total_benches, bench_capacity
            ),
            SeatingError::BenchCapacityMismatch {
                requested,
                committed,
            } => format!(
                "a sibling exam already uses {} students per bench, not {}; please select {}",
                committed, requested, committed
            ),
            SeatingError::BenchCapacityExceedsSharing {
                bench_capacity,
                group_size,
            } => format!(
                "bench capacity {} exceeds the {} classes sharing each bench",
                bench_capacity, group_size
            ),
            SeatingError::SeatingConflict { conflicts } => {
                format!("{} seat(s) already occupied", conflicts.len())
            }
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            SeatingError::UnsupportedClass { class_number } => {
                Some(json!({ "classNumber": class_number }))
            }
            SeatingError::InvalidLayout { .. } => None,
            SeatingError::InsufficientCapacity {
                total_benches,
                bench_capacity,
                occupied,
                requested,
            } => Some(json!({
                "totalBenches": total_benches,
                "benchCapacity": bench_capacity,
                "occupiedSeats": occupied,
                "requestedSeats": requested
            })),
            SeatingError::BenchCapacityMismatch {
                requested,
                committed,
            } => Some(json!({ "requested": requested, "committed": committed })),
            SeatingError::BenchCapacityExceedsSharing {
                bench_capacity,
                group_size,
            } => Some(json!({ "benchCapacity": bench_capacity, "groupSize": group_size })),
            SeatingError::SeatingConflict { conflicts } => Some(json!({
                "conflicts": serde_json::to_value(conflicts).unwrap_or(serde_json::Value::Null)
            })),
        }
    }
}

impl std::fmt::Display for SeatingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SeatingError {}
