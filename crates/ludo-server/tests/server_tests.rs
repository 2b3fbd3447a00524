//! End-to-end message flow through the server without a socket.

use ludo_core::{Color, TokenPosition};
use ludo_server::protocol::{ClientMessage, EventType, RoomStatus, ServerMessage};
use ludo_server::server::{handle_disconnect, handle_message, ServerState};
use ludo_server::OrchestratorConfig;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

struct Client {
    id: Uuid,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn connect(state: &ServerState) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        state.hub.register(id, tx);
        Self { id, rx }
    }

    fn send(&self, state: &ServerState, msg: ClientMessage) {
        handle_message(self.id, msg, state);
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn state() -> ServerState {
    ServerState::new(OrchestratorConfig {
        allow_dice_override: true,
    })
}

/// Create a room with two seated clients and start it
fn started_game(state: &ServerState) -> (String, Client, Client) {
    let mut red = Client::connect(state);
    let mut green = Client::connect(state);

    red.send(state, ClientMessage::CreateRoom { name: Some("test".into()) });
    let code = match red.drain().pop() {
        Some(ServerMessage::RoomCreated { room }) => room.code,
        other => panic!("expected RoomCreated, got {:?}", other),
    };

    for (client, name) in [(&red, "alice"), (&green, "bob")] {
        client.send(
            state,
            ClientMessage::JoinRoom {
                room_code: code.clone(),
                player_name: name.into(),
                preferred_color: None,
            },
        );
    }
    red.send(state, ClientMessage::StartGame);
    red.drain();
    green.drain();
    (code, red, green)
}

#[test]
fn test_join_and_start_flow() {
    let state = state();
    let mut host = Client::connect(&state);
    let mut guest = Client::connect(&state);

    host.send(&state, ClientMessage::CreateRoom { name: None });
    let code = match host.drain().pop() {
        Some(ServerMessage::RoomCreated { room }) => room.code,
        other => panic!("expected RoomCreated, got {:?}", other),
    };

    host.send(
        &state,
        ClientMessage::JoinRoom {
            room_code: code.clone(),
            player_name: "alice".into(),
            preferred_color: Some("yellow".into()),
        },
    );
    match host.drain().pop() {
        Some(ServerMessage::JoinedRoom { player, .. }) => assert_eq!(player.color, Color::Yellow),
        other => panic!("expected JoinedRoom, got {:?}", other),
    }

    guest.send(
        &state,
        ClientMessage::JoinRoom {
            room_code: code.clone(),
            player_name: "bob".into(),
            preferred_color: Some("yellow".into()),
        },
    );
    match guest.drain().pop() {
        Some(ServerMessage::JoinedRoom { player, room }) => {
            assert_eq!(player.color, Color::Red);
            assert_eq!(room.players.len(), 2);
        }
        other => panic!("expected JoinedRoom, got {:?}", other),
    }
    assert!(host
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::RoomUpdated { .. })));

    guest.send(&state, ClientMessage::StartGame);
    for client in [&mut host, &mut guest] {
        let msgs = client.drain();
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::RoomUpdated { room } if room.status == RoomStatus::Started
        )));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::GameStarted { state } if state.current_turn_color == Some(Color::Yellow)
        )));
    }
}

#[test]
fn test_roll_reply_and_broadcast() {
    let state = state();
    let (code, mut red, mut green) = started_game(&state);

    red.send(
        &state,
        ClientMessage::Roll {
            room_code: code.clone(),
            color: "red".into(),
        },
    );

    let red_msgs = red.drain();
    assert!(red_msgs.iter().any(|m| matches!(
        m,
        ServerMessage::GameEvent(env) if env.event_type == EventType::DiceRolled
    )));
    assert!(red_msgs
        .iter()
        .any(|m| matches!(m, ServerMessage::GameState { state } if state.last_dice_roll.is_some())));

    let green_msgs = green.drain();
    assert_eq!(green_msgs.len(), 1);
    assert!(matches!(&green_msgs[0], ServerMessage::GameEvent(env) if env.meta.room_code == code));
}

#[test]
fn test_rejected_action_reports_error_code() {
    let state = state();
    let (code, _red, mut green) = started_game(&state);

    green.send(
        &state,
        ClientMessage::Move {
            room_code: code.clone(),
            color: "GREEN".into(),
            token_index: 0,
            dice: Some(6),
        },
    );

    match green.drain().pop() {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "TURN_VIOLATION"),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[test]
fn test_move_and_get_state() {
    let state = state();
    let (code, mut red, mut green) = started_game(&state);

    red.send(
        &state,
        ClientMessage::Move {
            room_code: code.clone(),
            color: "RED".into(),
            token_index: 3,
            dice: Some(6),
        },
    );
    red.drain();
    green.drain();

    green.send(&state, ClientMessage::GetState { room_code: code });
    match green.drain().pop() {
        Some(ServerMessage::GameState { state }) => {
            assert_eq!(state.tokens[&Color::Red][3], TokenPosition::Track(0));
            assert_eq!(state.current_turn_color, Some(Color::Red));
        }
        other => panic!("expected GameState, got {:?}", other),
    }
}

#[test]
fn test_last_leave_tears_room_down() {
    let state = state();
    let mut solo = Client::connect(&state);

    solo.send(&state, ClientMessage::CreateRoom { name: None });
    let code = match solo.drain().pop() {
        Some(ServerMessage::RoomCreated { room }) => room.code,
        other => panic!("expected RoomCreated, got {:?}", other),
    };
    solo.send(
        &state,
        ClientMessage::JoinRoom {
            room_code: code.clone(),
            player_name: "solo".into(),
            preferred_color: None,
        },
    );
    solo.send(&state, ClientMessage::LeaveRoom);
    assert!(solo
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::LeftRoom)));

    solo.send(&state, ClientMessage::GetState { room_code: code });
    match solo.drain().pop() {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NOT_FOUND"),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[test]
fn test_list_rooms() {
    let state = state();
    let mut client = Client::connect(&state);

    let mut codes = Vec::new();
    for name in ["first", "second"] {
        client.send(&state, ClientMessage::CreateRoom { name: Some(name.into()) });
        match client.drain().pop() {
            Some(ServerMessage::RoomCreated { room }) => codes.push(room.code),
            other => panic!("expected RoomCreated, got {:?}", other),
        }
    }

    client.send(&state, ClientMessage::ListRooms);
    match client.drain().pop() {
        Some(ServerMessage::RoomList { rooms }) => {
            assert_eq!(rooms.len(), 2);
            for code in &codes {
                assert!(rooms.iter().any(|r| &r.code == code));
            }
            assert!(rooms.iter().all(|r| r.status == RoomStatus::Lobby));
        }
        other => panic!("expected RoomList, got {:?}", other),
    }
}

#[test]
fn test_disconnect_in_lobby_frees_seat() {
    let state = state();
    let mut host = Client::connect(&state);
    let guest = Client::connect(&state);

    host.send(&state, ClientMessage::CreateRoom { name: None });
    let code = match host.drain().pop() {
        Some(ServerMessage::RoomCreated { room }) => room.code,
        other => panic!("expected RoomCreated, got {:?}", other),
    };
    for (client, name) in [(&host, "alice"), (&guest, "bob")] {
        client.send(
            &state,
            ClientMessage::JoinRoom {
                room_code: code.clone(),
                player_name: name.into(),
                preferred_color: None,
            },
        );
    }
    host.drain();

    handle_disconnect(guest.id, &state);

    assert_eq!(state.lobby.room(&code).unwrap().players.len(), 1);
    assert!(host.drain().iter().any(|m| matches!(
        m,
        ServerMessage::RoomUpdated { room } if room.players.len() == 1
    )));
}

#[test]
fn test_abandoned_game_is_torn_down() {
    let state = state();
    let (code, red, green) = started_game(&state);
    red.send(
        &state,
        ClientMessage::Roll {
            room_code: code.clone(),
            color: "RED".into(),
        },
    );
    assert_eq!(state.orchestrator.section_count(), 1);

    // seats in a running game survive a single disconnect
    handle_disconnect(green.id, &state);
    let room = state.lobby.room(&code).unwrap();
    assert_eq!(room.status, RoomStatus::Started);
    assert_eq!(room.players.len(), 2);
    assert_eq!(state.orchestrator.section_count(), 1);

    handle_disconnect(red.id, &state);
    assert!(state.lobby.room(&code).is_err());
    assert_eq!(state.orchestrator.section_count(), 0);
    assert!(state.orchestrator.history(&code).is_empty());
    assert_eq!(state.hub.subscriber_count(&code), 0);
}
