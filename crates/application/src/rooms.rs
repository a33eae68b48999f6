//! 进程内的群组房间表
//!
//! 房间只是连接的订阅关系，授权始终以成员解析器的实时结果为准。

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use domain::{ConnectionId, GroupId, UserId};

use crate::connection::ConnectionHandle;

pub fn room_name(group_id: GroupId) -> String {
    format!("group_{group_id}")
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<GroupId, HashMap<ConnectionId, ConnectionHandle>>,
    joined: DashMap<ConnectionId, HashSet<GroupId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入房间，已在房间中时返回 false
    pub fn join(&self, group_id: GroupId, handle: ConnectionHandle) -> bool {
        let connection_id = handle.id();
        let inserted = self
            .rooms
            .entry(group_id)
            .or_default()
            .insert(connection_id, handle)
            .is_none();
        self.joined
            .entry(connection_id)
            .or_default()
            .insert(group_id);
        inserted
    }

    pub fn leave(&self, group_id: GroupId, connection_id: ConnectionId) -> bool {
        let removed = self.remove_from_room(group_id, connection_id);
        if let Some(mut groups) = self.joined.get_mut(&connection_id) {
            groups.remove(&group_id);
        }
        self.joined.remove_if(&connection_id, |_, groups| groups.is_empty());
        removed
    }

    /// 断开时离开所有房间，返回离开的群组
    pub fn leave_all(&self, connection_id: ConnectionId) -> Vec<GroupId> {
        let groups: Vec<GroupId> = self
            .joined
            .remove(&connection_id)
            .map(|(_, groups)| groups.into_iter().collect())
            .unwrap_or_default();
        for group_id in &groups {
            self.remove_from_room(*group_id, connection_id);
        }
        groups
    }

    /// 将某个用户的所有连接移出房间，返回移除的连接数
    pub fn evict_user(&self, group_id: GroupId, user_id: UserId) -> usize {
        let evicted: Vec<ConnectionId> = match self.rooms.get_mut(&group_id) {
            Some(mut room) => {
                let ids: Vec<ConnectionId> = room
                    .values()
                    .filter(|handle| handle.user_id() == user_id)
                    .map(ConnectionHandle::id)
                    .collect();
                for id in &ids {
                    room.remove(id);
                }
                ids
            }
            None => Vec::new(),
        };
        self.rooms.remove_if(&group_id, |_, room| room.is_empty());

        for connection_id in &evicted {
            if let Some(mut groups) = self.joined.get_mut(connection_id) {
                groups.remove(&group_id);
            }
        }
        evicted.len()
    }

    /// 清空整个房间（群组停用）
    pub fn clear(&self, group_id: GroupId) -> usize {
        let Some((_, room)) = self.rooms.remove(&group_id) else {
            return 0;
        };
        for connection_id in room.keys() {
            if let Some(mut groups) = self.joined.get_mut(connection_id) {
                groups.remove(&group_id);
            }
        }
        room.len()
    }

    /// 房间内连接的快照
    pub fn connections(&self, group_id: GroupId) -> Vec<ConnectionHandle> {
        self.rooms
            .get(&group_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection_id: ConnectionId) -> HashSet<GroupId> {
        self.joined
            .get(&connection_id)
            .map(|groups| groups.clone())
            .unwrap_or_default()
    }

    fn remove_from_room(&self, group_id: GroupId, connection_id: ConnectionId) -> bool {
        let removed = self
            .rooms
            .get_mut(&group_id)
            .map(|mut room| room.remove(&connection_id).is_some())
            .unwrap_or(false);
        self.rooms.remove_if(&group_id, |_, room| room.is_empty());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leave_all_clears_every_room() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(UserId::generate(), 4);
        let g1 = GroupId::generate();
        let g2 = GroupId::generate();

        assert!(registry.join(g1, handle.clone()));
        assert!(!registry.join(g1, handle.clone()));
        registry.join(g2, handle.clone());

        let mut left = registry.leave_all(handle.id());
        left.sort();
        let mut expected = vec![g1, g2];
        expected.sort();
        assert_eq!(left, expected);
        assert!(registry.connections(g1).is_empty());
        assert!(registry.rooms_of(handle.id()).is_empty());
    }

    #[test]
    fn evict_user_only_touches_that_user() {
        let registry = RoomRegistry::new();
        let group = GroupId::generate();
        let removed_user = UserId::generate();
        let (removed, _rx1) = ConnectionHandle::channel(removed_user, 4);
        let (kept, _rx2) = ConnectionHandle::channel(UserId::generate(), 4);

        registry.join(group, removed.clone());
        registry.join(group, kept.clone());

        assert_eq!(registry.evict_user(group, removed_user), 1);
        let remaining: Vec<_> = registry.connections(group).iter().map(|h| h.id()).collect();
        assert_eq!(remaining, vec![kept.id()]);
        assert!(registry.rooms_of(removed.id()).is_empty());
    }

    #[test]
    fn room_name_uses_group_prefix() {
        let group = GroupId::generate();
        assert_eq!(room_name(group), format!("group_{group}"));
    }
}
