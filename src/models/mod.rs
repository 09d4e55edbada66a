mod channel;
mod feed;
mod user;
mod video;

pub use channel::{Channel, ChannelIds, NewChannel};
pub use feed::Feed;
pub use user::User;
pub use video::VideoRecord;
