use std::cmp::Ordering;

use serde::Serialize;

use crate::tracking::{Freshness, PositionSession, Role};

/// One line of the peer list shown to the seeker.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RosterEntry {
    pub peer_id: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub distance_m: Option<f64>,
    pub bearing_deg: Option<f64>,
    /// Freshness of the peer's own last fix
    pub freshness: Freshness,
}

impl RosterEntry {
    pub fn from_session(session: &PositionSession, now_ms: i64) -> Self {
        let target = session.target();
        Self {
            peer_id: target.peer_id.clone(),
            display_name: target.display_name.clone(),
            avatar_ref: target.avatar_ref.clone(),
            distance_m: session.current_distance(),
            bearing_deg: session.current_bearing(),
            freshness: session.role_freshness(Role::Target, now_ms),
        }
    }
}

/// Projects peer sessions into a roster sorted nearest first.
///
/// Peers without a distance go last; ties are broken by peer id. Calling this
/// has no effect on the sessions.
pub fn snapshot<'a>(
    sessions: impl IntoIterator<Item = &'a PositionSession>,
    now_ms: i64,
) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = sessions
        .into_iter()
        .map(|session| RosterEntry::from_session(session, now_ms))
        .collect();
    entries.sort_by(compare_entries);
    entries
}

fn compare_entries(a: &RosterEntry, b: &RosterEntry) -> Ordering {
    let by_distance = match (a.distance_m, b.distance_m) {
        (Some(da), Some(db)) => da.total_cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_distance.then_with(|| a.peer_id.cmp(&b.peer_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geo::{self, Coord},
        signal::{FixSource, GeoFix},
        tracking::PeerProfile,
    };

    const NOW_MS: i64 = 1_000_000;

    fn session_at(peer_id: &str, distance_m: Option<f64>) -> PositionSession {
        let seeker = Coord::new(40.0, -74.0);
        let session = PositionSession::new("event-1", PeerProfile::new(peer_id, peer_id.to_uppercase()));
        session
            .ingest(GeoFix::new(seeker, 5., FixSource::Gps, NOW_MS), Role::Seeker)
            .unwrap();
        if let Some(distance_m) = distance_m {
            let target = geo::offset(seeker, 45., distance_m);
            session
                .ingest(GeoFix::new(target, 5., FixSource::Gps, NOW_MS), Role::Target)
                .unwrap();
        }
        session
    }

    #[test]
    fn test_sorted_nearest_first_missing_last() {
        let sessions = vec![
            session_at("a", None),
            session_at("b", Some(50.)),
            session_at("c", Some(5.)),
            session_at("d", None),
            session_at("e", Some(20.)),
        ];

        let roster = snapshot(&sessions, NOW_MS);

        let ids: Vec<&str> = roster.iter().map(|e| e.peer_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "e", "b", "a", "d"]);
        let distances: Vec<Option<i64>> = roster
            .iter()
            .map(|e| e.distance_m.map(|d| d.round() as i64))
            .collect();
        assert_eq!(distances, vec![Some(5), Some(20), Some(50), None, None]);
    }

    #[test]
    fn test_ties_broken_by_peer_id() {
        let sessions = vec![session_at("zoe", Some(10.)), session_at("amy", Some(10.))];
        let roster = snapshot(&sessions, NOW_MS);
        assert_eq!(roster[0].peer_id, "amy");
        assert_eq!(roster[1].peer_id, "zoe");
    }

    #[test]
    fn test_freshness_and_bearing() {
        let sessions = vec![session_at("a", Some(30.)), session_at("b", None)];
        let roster = snapshot(&sessions, NOW_MS + 60_000);

        assert_eq!(roster[0].freshness, Freshness::Recent);
        assert!((roster[0].bearing_deg.unwrap() - 45.).abs() < 0.1);
        assert_eq!(roster[0].display_name, "A");
        // no target fix at all
        assert_eq!(roster[1].freshness, Freshness::Stale);
        assert_eq!(roster[1].bearing_deg, None);
    }

    #[test]
    fn test_snapshot_is_repeatable() {
        let sessions = vec![session_at("a", Some(30.)), session_at("b", Some(3.))];
        let first = snapshot(&sessions, NOW_MS);
        let second = snapshot(&sessions, NOW_MS);
        assert_eq!(first, second);
        assert_eq!(sessions[0].history_len(), 2);
    }
}
