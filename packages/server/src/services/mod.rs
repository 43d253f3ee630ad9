pub mod channels;
pub mod entitlement;
pub mod game_service;
pub mod narration;
pub mod rewards;
pub mod selection;
pub mod session;
pub mod supabase;
